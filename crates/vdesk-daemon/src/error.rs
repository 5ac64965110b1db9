//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("remote session error: {0:#}")]
    Session(anyhow::Error),

    #[error("input error: {0}")]
    Input(#[from] vdesk_input::InputError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
