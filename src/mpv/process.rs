//! MPV binary detection and process spawning.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("Failed to spawn MPV: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// Default IPC socket/pipe path for MPV.
pub fn default_ipc_path() -> String {
  #[cfg(windows)]
  {
    r"\\.\pipe\flicvid-mpv".to_string()
  }
  #[cfg(not(windows))]
  {
    "/tmp/flicvid-mpv.sock".to_string()
  }
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  // Platform-specific common locations
  #[cfg(windows)]
  {
    let common_paths = [
      r"C:\Program Files\mpv\mpv.exe",
      r"C:\Program Files (x86)\mpv\mpv.exe",
      r"C:\mpv\mpv.exe",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "macos")]
  {
    let common_paths = [
      "/usr/local/bin/mpv",
      "/opt/homebrew/bin/mpv",
      "/Applications/mpv.app/Contents/MacOS/mpv",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "linux")]
  {
    let common_paths = ["/usr/bin/mpv", "/usr/local/bin/mpv"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  None
}

/// Spawn MPV fullscreen with the IPC server enabled.
///
/// The process is started idle: clip loading, looping and muting are all
/// driven afterwards over IPC so crash-restart can reuse the same path.
pub fn spawn_mpv(
  mpv_path: Option<&PathBuf>,
  ipc_path: &str,
  extra_args: &[String],
) -> Result<Child, ProcessError> {
  let mpv_exe = mpv_path
    .cloned()
    .or_else(find_mpv)
    .ok_or(ProcessError::NotFound)?;

  log::info!("Spawning MPV: {:?} with IPC: {}", mpv_exe, ipc_path);
  if !extra_args.is_empty() {
    log::info!("Extra MPV args: {:?}", extra_args);
  }

  let mut cmd = Command::new(&mpv_exe);
  cmd
    .arg(format!("--input-ipc-server={}", ipc_path))
    .arg("--idle=yes")
    .arg("--fullscreen")
    .arg("--force-window")
    .arg("--keep-open=no")
    .arg("--no-osc")
    .arg("--no-terminal");

  for arg in extra_args {
    cmd.arg(arg);
  }

  let child = cmd
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()?;

  Ok(child)
}

/// Remove a stale IPC socket file.
pub fn cleanup_ipc(ipc_path: &str) {
  #[cfg(not(windows))]
  {
    let _ = std::fs::remove_file(ipc_path);
  }
  // Windows named pipes are cleaned up automatically
  #[cfg(windows)]
  {
    let _ = ipc_path;
  }
}

/// Wait for MPV to create its IPC socket, up to `budget`.
///
/// Returns false on timeout; callers proceed to the connect retry path
/// either way, this just avoids burning connect attempts while MPV is
/// still starting up.
pub async fn wait_for_socket(ipc_path: &str, budget: Duration) -> bool {
  #[cfg(windows)]
  {
    // Named pipes have no filesystem presence to poll; rely on connect retries.
    let _ = (ipc_path, budget);
    true
  }
  #[cfg(not(windows))]
  {
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
      if Path::new(ipc_path).exists() {
        return true;
      }
      tokio::time::sleep(Duration::from_millis(100)).await;
    }
    log::warn!("MPV socket {} did not appear within {:?}", ipc_path, budget);
    false
  }
}
