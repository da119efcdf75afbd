//! Error types for transport sessions

use std::time::Duration;

use thiserror::Error;

use crate::session::TransportState;

/// Errors raised by a transport or its file channel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport is not connected")]
    NotConnected,

    #[error("Operation requires {expected} but session is {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: TransportState,
    },

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Authentication failed for {user}")]
    Authentication { user: String },

    #[error("Host key mismatch for {endpoint}: expected {expected}, got {actual}")]
    HostKeyMismatch {
        endpoint: String,
        expected: String,
        actual: String,
    },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Shell channel closed by remote")]
    ShellClosed,

    #[error("Remote file error: {0}")]
    File(String),

    #[error("Known hosts error: {0}")]
    KnownHosts(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Channel(_) | TransportError::ShellClosed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
