//! High-level MPV client with command methods.

use std::path::PathBuf;
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;

use super::ipc::{IpcError, MpvIpc};
use super::process::{cleanup_ipc, spawn_mpv, wait_for_socket, ProcessError};
use super::protocol::{MpvCommand, MpvEvent, MpvResponse, PropertyValue};

/// How long to wait for the IPC socket to appear after spawning.
const SOCKET_WAIT_BUDGET: Duration = Duration::from_secs(5);

/// Connect attempts after spawn (backoff grows inside MpvIpc::connect).
const CONNECT_ATTEMPTS: u32 = 8;

#[derive(Error, Debug)]
pub enum MpvError {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("IPC error: {0}")]
  Ipc(#[from] IpcError),
  #[error("MPV command failed: {0}")]
  CommandFailed(String),
  #[error("Not connected")]
  NotConnected,
}

/// Coarse playback state reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
  Playing,
  Paused,
  Stopped,
}

/// Transient playback snapshot, pulled from the player and discarded
/// after the reconciliation decision it feeds.
#[derive(Debug, Clone)]
pub struct PlaybackStatus {
  pub state: PlaybackState,
  pub position_secs: Option<f64>,
  pub duration_secs: Option<f64>,
}

/// High-level MPV client owning the player process and its IPC connection.
pub struct MpvClient {
  mpv_path: Option<PathBuf>,
  extra_args: Vec<String>,
  ipc_path: String,
  process: Mutex<Option<Child>>,
  ipc: Mutex<Option<Arc<MpvIpc>>>,
}

impl MpvClient {
  /// Create a new MPV client. Nothing is spawned until `start`.
  pub fn new(mpv_path: Option<PathBuf>, ipc_path: String, extra_args: Vec<String>) -> Self {
    Self {
      mpv_path,
      extra_args,
      ipc_path,
      process: Mutex::new(None),
      ipc: Mutex::new(None),
    }
  }

  /// Start MPV and connect to its IPC socket.
  pub async fn start(&self) -> Result<(), MpvError> {
    cleanup_ipc(&self.ipc_path);

    let child = spawn_mpv(self.mpv_path.as_ref(), &self.ipc_path, &self.extra_args)?;
    {
      let mut process = self.process.lock();
      *process = Some(child);
    }

    wait_for_socket(&self.ipc_path, SOCKET_WAIT_BUDGET).await;

    let ipc_conn = MpvIpc::connect(&self.ipc_path, CONNECT_ATTEMPTS).await?;
    {
      let mut ipc = self.ipc.lock();
      *ipc = Some(Arc::new(ipc_conn));
    }

    log::info!("MPV client connected on {}", self.ipc_path);
    Ok(())
  }

  /// Stop MPV and disconnect.
  pub async fn stop(&self) {
    {
      let mut ipc = self.ipc.lock();
      if let Some(conn) = ipc.take() {
        conn.close();
      }
    }

    let child = {
      let mut process = self.process.lock();
      process.take()
    };

    if let Some(mut child) = child {
      let pid = child.id();
      log::info!("Killing MPV process (pid: {})", pid);

      // kill/wait are blocking; keep them off the async runtime
      let result = tokio::task::spawn_blocking(move || {
        let kill_result = child.kill();
        let wait_result = child.wait();
        (kill_result, wait_result)
      })
      .await;

      match result {
        Ok((kill_result, wait_result)) => {
          if let Err(e) = kill_result {
            log::warn!("kill() failed: {}", e);
          }
          match wait_result {
            Ok(status) => log::info!("MPV process exited with: {}", status),
            Err(e) => log::warn!("wait() failed: {}", e),
          }
        }
        Err(e) => {
          log::error!("spawn_blocking panicked during process cleanup: {}", e);
        }
      }
    }

    cleanup_ipc(&self.ipc_path);
    log::info!("MPV client stopped");
  }

  /// Check whether the tracked player process is still running.
  ///
  /// `try_wait` reaps the process if it has exited; a dead process also
  /// drops its handle here so a later `start` begins clean.
  pub fn is_running(&self) -> bool {
    let mut process = self.process.lock();
    match process.as_mut() {
      Some(child) => match child.try_wait() {
        Ok(Some(status)) => {
          log::warn!("MPV process exited with: {}", status);
          *process = None;
          false
        }
        Ok(None) => true,
        Err(e) => {
          log::error!("Failed to poll MPV process: {}", e);
          false
        }
      },
      None => false,
    }
  }

  /// Get a clone of the IPC connection.
  fn get_ipc(&self) -> Result<Arc<MpvIpc>, MpvError> {
    let guard = self.ipc.lock();
    guard.clone().ok_or(MpvError::NotConnected)
  }

  /// Send a command to MPV.
  async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, MpvError> {
    let ipc = self.get_ipc()?;
    let response = ipc.send_command(cmd).await?;

    if !response.is_success() {
      return Err(MpvError::CommandFailed(response.error));
    }

    Ok(response)
  }

  /// Load a file, replacing the current playlist entry.
  pub async fn loadfile_replace(&self, path: &str) -> Result<(), MpvError> {
    log::info!("Loading file: {}", path);
    self.send(MpvCommand::loadfile_replace(path)).await?;
    Ok(())
  }

  /// Set file looping on or off.
  pub async fn set_loop_file(&self, looping: bool) -> Result<(), MpvError> {
    self.send(MpvCommand::set_loop_file(looping)).await?;
    Ok(())
  }

  /// Set mute state.
  pub async fn set_mute(&self, muted: bool) -> Result<(), MpvError> {
    self.send(MpvCommand::set_mute(muted)).await?;
    Ok(())
  }

  /// Set pause state.
  pub async fn set_pause(&self, paused: bool) -> Result<(), MpvError> {
    self.send(MpvCommand::set_pause(paused)).await?;
    Ok(())
  }

  /// Toggle pause state.
  pub async fn cycle_pause(&self) -> Result<(), MpvError> {
    self.send(MpvCommand::cycle("pause")).await?;
    Ok(())
  }

  /// Drop any queued playlist entries beyond the current one.
  pub async fn playlist_clear(&self) -> Result<(), MpvError> {
    self.send(MpvCommand::playlist_clear()).await?;
    Ok(())
  }

  /// Get a property value.
  pub async fn get_property(&self, name: &str) -> Result<PropertyValue, MpvError> {
    let response = self.send(MpvCommand::get_property(name)).await?;
    Ok(
      response
        .data
        .map(PropertyValue::from)
        .unwrap_or(PropertyValue::Null),
    )
  }

  /// Snapshot the player's playback state from its properties.
  ///
  /// `idle-active` is authoritative for "nothing loaded"; position and
  /// duration are best-effort (absent while idle or during load).
  pub async fn playback_status(&self) -> Result<PlaybackStatus, MpvError> {
    let idle = self
      .get_property("idle-active")
      .await?
      .as_bool()
      .unwrap_or(false);

    if idle {
      return Ok(PlaybackStatus {
        state: PlaybackState::Stopped,
        position_secs: None,
        duration_secs: None,
      });
    }

    let paused = self.get_property("pause").await?.as_bool().unwrap_or(false);
    let position = self.get_property("time-pos").await.ok().and_then(|v| v.as_f64());
    let duration = self.get_property("duration").await.ok().and_then(|v| v.as_f64());

    Ok(PlaybackStatus {
      state: if paused {
        PlaybackState::Paused
      } else {
        PlaybackState::Playing
      },
      position_secs: position,
      duration_secs: duration,
    })
  }

  /// Quit MPV gracefully, then make sure the process is gone.
  pub async fn quit(&self) {
    if let Err(e) = self.send(MpvCommand::quit()).await {
      log::debug!("MPV quit command failed: {}", e);
    }
    self.stop().await;
  }

  /// Get event receiver for playback events, if connected.
  pub fn events(&self) -> Option<Receiver<MpvEvent>> {
    let guard = self.ipc.lock();
    guard.as_ref().map(|ipc| ipc.events())
  }
}
