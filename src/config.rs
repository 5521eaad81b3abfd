//! Application configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config file: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid configuration: {0}")]
  Invalid(String),
}

/// Application configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
  /// Address the HTTP server binds to.
  #[serde(default = "default_bind")]
  pub bind: String,

  /// The idle clip: looped, muted, shown whenever no action is playing.
  #[serde(default)]
  pub idle_video: PathBuf,

  /// Action clips by button id (1..3 by convention).
  #[serde(default)]
  pub videos: BTreeMap<u32, PathBuf>,

  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// IPC socket/pipe path for the MPV control channel.
  #[serde(default = "default_ipc_path")]
  pub ipc_path: String,

  /// Playback-monitor poll interval in seconds (fallback path; the
  /// primary end-of-clip signal is event driven).
  #[serde(default = "default_playback_poll_secs")]
  pub playback_poll_secs: u64,

  /// Crash-monitor poll interval in seconds.
  #[serde(default = "default_crash_poll_secs")]
  pub crash_poll_secs: u64,

  /// Max player restarts within the rolling window before the
  /// controller goes degraded and stops respawning.
  #[serde(default = "default_max_restarts")]
  pub max_restarts: u32,

  /// Rolling window for the restart budget, in seconds.
  #[serde(default = "default_restart_window_secs")]
  pub restart_window_secs: u64,
}

fn default_bind() -> String {
  "0.0.0.0:5555".to_string()
}

fn default_ipc_path() -> String {
  crate::mpv::default_ipc_path()
}

fn default_playback_poll_secs() -> u64 {
  2
}

fn default_crash_poll_secs() -> u64 {
  5
}

fn default_max_restarts() -> u32 {
  5
}

fn default_restart_window_secs() -> u64 {
  60
}

impl Default for Config {
  fn default() -> Self {
    Self {
      bind: default_bind(),
      idle_video: PathBuf::new(),
      videos: BTreeMap::new(),
      mpv_path: None,
      mpv_args: Vec::new(),
      ipc_path: default_ipc_path(),
      playback_poll_secs: default_playback_poll_secs(),
      crash_poll_secs: default_crash_poll_secs(),
      max_restarts: default_max_restarts(),
      restart_window_secs: default_restart_window_secs(),
    }
  }
}

impl Config {
  /// Default config file location.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("flicvid").join("config.json"))
  }

  /// Load configuration from `path`, or from the default location.
  ///
  /// A missing file yields defaults, which then fail validation with a
  /// pointer at the required fields.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let resolved = match path {
      Some(p) => Some(p.to_path_buf()),
      None => Self::default_path(),
    };

    let config = match resolved {
      Some(ref p) if p.is_file() => {
        log::info!("Loading config from {}", p.display());
        let raw = std::fs::read_to_string(p)?;
        serde_json::from_str(&raw)?
      }
      Some(ref p) => {
        log::warn!("Config file {} not found, using defaults", p.display());
        Self::default()
      }
      None => Self::default(),
    };

    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.idle_video.as_os_str().is_empty() {
      return Err("idleVideo must be set".to_string());
    }
    if self.bind.trim().is_empty() {
      return Err("bind address cannot be empty".to_string());
    }
    if self.ipc_path.trim().is_empty() {
      return Err("ipcPath cannot be empty".to_string());
    }
    if self.playback_poll_secs == 0 || self.crash_poll_secs == 0 {
      return Err("poll intervals must be at least 1 second".to_string());
    }
    if self.restart_window_secs == 0 {
      return Err("restartWindowSecs must be at least 1 second".to_string());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.bind, "0.0.0.0:5555");
    assert_eq!(config.playback_poll_secs, 2);
    assert_eq!(config.crash_poll_secs, 5);
    assert_eq!(config.max_restarts, 5);
    assert!(config.videos.is_empty());
  }

  #[test]
  fn test_defaults_fail_validation_without_idle_video() {
    assert!(Config::default().validate().is_err());
  }

  #[test]
  fn test_parse_camel_case_json() {
    let json = r#"{
      "bind": "127.0.0.1:8099",
      "idleVideo": "/videos/idle.mp4",
      "videos": { "1": "/videos/one.mp4", "2": "/videos/two.mp4" },
      "mpvArgs": ["--no-border"],
      "maxRestarts": 3
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.bind, "127.0.0.1:8099");
    assert_eq!(config.idle_video, PathBuf::from("/videos/idle.mp4"));
    assert_eq!(config.videos.len(), 2);
    assert_eq!(config.mpv_args, vec!["--no-border".to_string()]);
    assert_eq!(config.max_restarts, 3);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_zero_poll_interval_rejected() {
    let mut config = Config::default();
    config.idle_video = PathBuf::from("/videos/idle.mp4");
    config.playback_poll_secs = 0;
    assert!(config.validate().is_err());
  }
}
