//! Input subsystem errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot enumerate device directory {path}: {source}")]
    DeviceDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open device {path}: {reason}")]
    DeviceOpen { path: PathBuf, reason: String },

    #[error("failed to read from device: {0}")]
    Read(#[source] std::io::Error),

    #[error("poll failed: {0}")]
    Poll(#[from] nix::Error),

    #[error("failed to spawn input worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
