//! MPV module - spawns and controls the external MPV player via JSON IPC.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection and process spawning
//! - `ipc.rs` - Async IPC connection (Named Pipes on Windows, Unix sockets on Linux/macOS)
//! - `protocol.rs` - JSON command/response types and serialization
//! - `client.rs` - High-level MPV client with command methods

mod client;
mod ipc;
mod process;
mod protocol;

pub use client::{MpvClient, MpvError, PlaybackState, PlaybackStatus};
pub use process::{default_ipc_path, find_mpv};
pub use protocol::{MpvCommand, MpvEvent, MpvResponse, PropertyValue};
