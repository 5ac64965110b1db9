//! vdesk daemon.
//!
//! Loads configuration, drives the GNOME Mutter remote desktop session the
//! forwarded input lands in, and supervises the input worker, restarting it
//! with a fresh discovery when a device is unplugged.

pub mod config;
pub mod daemon;
pub mod error;
pub mod session;
pub mod setup;

pub use config::Config;
pub use daemon::Daemon;
pub use error::DaemonError;
pub use session::MutterSession;
