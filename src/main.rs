use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use flicvid::catalog::VideoCatalog;
use flicvid::config::Config;
use flicvid::mpv::MpvClient;
use flicvid::server::build_router;
use flicvid::session::PlayerSession;

/// HTTP-triggered video playback controller for mpv.
#[derive(Debug, Parser)]
#[command(name = "flicvid", version)]
struct Args {
  /// Path to the JSON config file.
  #[arg(long, env = "FLICVID_CONFIG")]
  config: Option<PathBuf>,

  /// Bind address, overrides the config file.
  #[arg(long, env = "FLICVID_BIND")]
  bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let bind = args.bind.unwrap_or_else(|| config.bind.clone());

  let catalog = VideoCatalog::new(config.idle_video.clone(), config.videos.clone())?;
  info!(
    "Video catalog: idle={}, {} action clips",
    catalog.idle().display(),
    catalog.len()
  );

  let mpv = MpvClient::new(
    config.mpv_path.as_ref().map(PathBuf::from),
    config.ipc_path.clone(),
    config.mpv_args.clone(),
  );

  let session = PlayerSession::new(mpv, catalog, &config);
  session.start().await?;

  let app = build_router(session.clone());
  let addr: SocketAddr = bind.parse()?;
  info!("flicvid listening on http://{addr}");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  session.stop().await;
  info!("Shutdown complete");
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c().await.ok();
  };

  #[cfg(unix)]
  let term = async {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
    sigterm.recv().await;
  };

  #[cfg(not(unix))]
  let term = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = term => {},
  }

  warn!("Shutdown signal received");
}
