//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Global request ID counter for unique command identification.
static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

/// Generate a unique request ID for MPV commands.
pub fn next_request_id() -> i64 {
  REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Command sent to MPV via IPC.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
  pub command: Vec<serde_json::Value>,
  pub request_id: i64,
}

impl MpvCommand {
  /// Create a new command with auto-generated request ID.
  pub fn new(args: Vec<serde_json::Value>) -> Self {
    Self {
      command: args,
      request_id: next_request_id(),
    }
  }

  /// Load a file, replacing whatever is currently playing.
  pub fn loadfile_replace(path: &str) -> Self {
    Self::new(vec!["loadfile".into(), path.into(), "replace".into()])
  }

  /// Set file looping: `inf` when true, `no` when false.
  pub fn set_loop_file(looping: bool) -> Self {
    let value = if looping { "inf" } else { "no" };
    Self::new(vec!["set_property".into(), "loop-file".into(), value.into()])
  }

  /// Set mute state.
  pub fn set_mute(muted: bool) -> Self {
    Self::new(vec!["set_property".into(), "mute".into(), muted.into()])
  }

  /// Set pause state.
  pub fn set_pause(paused: bool) -> Self {
    Self::new(vec!["set_property".into(), "pause".into(), paused.into()])
  }

  /// Cycle (toggle) a property.
  pub fn cycle(property: &str) -> Self {
    Self::new(vec!["cycle".into(), property.into()])
  }

  /// Clear all playlist entries except the currently playing one.
  pub fn playlist_clear() -> Self {
    Self::new(vec!["playlist-clear".into()])
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Quit MPV.
  pub fn quit() -> Self {
    Self::new(vec!["quit".into()])
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
  /// "success" or error message.
  pub error: String,
  /// Response data (command-specific).
  pub data: Option<serde_json::Value>,
  /// Matching request ID.
  pub request_id: i64,
}

impl MpvResponse {
  /// Check if the command succeeded.
  pub fn is_success(&self) -> bool {
    self.error == "success"
  }
}

/// Event sent by MPV (property changes, playback events, etc.).
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
  /// Event type (e.g., "property-change", "end-file", "idle").
  pub event: String,
  /// Observer ID for property-change events.
  pub id: Option<i64>,
  /// Property name for property-change events.
  pub name: Option<String>,
  /// Event data.
  pub data: Option<serde_json::Value>,
  /// Reason for end-file events ("eof", "stop", "quit", "error").
  pub reason: Option<String>,
}

impl MpvEvent {
  /// True when this event marks a clip that played through to its end.
  pub fn is_natural_end(&self) -> bool {
    self.event == "end-file" && self.reason.as_deref() == Some("eof")
  }
}

/// Typed property values from MPV.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
  Bool(bool),
  Number(f64),
  String(String),
  Json(serde_json::Value),
  Null,
}

impl PropertyValue {
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      PropertyValue::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      PropertyValue::Number(n) => Some(*n),
      _ => None,
    }
  }
}

impl From<serde_json::Value> for PropertyValue {
  fn from(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Bool(b) => PropertyValue::Bool(b),
      serde_json::Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
      serde_json::Value::String(s) => PropertyValue::String(s),
      serde_json::Value::Array(_) | serde_json::Value::Object(_) => PropertyValue::Json(value),
      serde_json::Value::Null => PropertyValue::Null,
    }
  }
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    // Responses carry a request_id, everything else is an event
    if line.contains("request_id") {
      let response: MpvResponse = serde_json::from_str(line)?;
      Ok(MpvMessage::Response(response))
    } else {
      let event: MpvEvent = serde_json::from_str(line)?;
      Ok(MpvMessage::Event(event))
    }
  }
}
