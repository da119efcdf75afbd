//! Error types for the terminal engine

use std::time::Duration;

use remsh_transport::TransportError;
use thiserror::Error;

/// Errors returned by [`TerminalEngine`](crate::TerminalEngine) operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No session attached")]
    NotConnected,

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}
