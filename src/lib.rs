pub mod catalog;
pub mod config;
pub mod mpv;
pub mod server;
pub mod session;

pub use catalog::VideoCatalog;
pub use config::Config;
pub use session::PlayerSession;
