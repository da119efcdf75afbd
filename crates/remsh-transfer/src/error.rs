//! Error types for file transfers

use std::path::PathBuf;

use remsh_guard::TransferRejection;
use remsh_transport::TransportError;
use thiserror::Error;

/// Errors that can occur during file transfer operations
#[derive(Error, Debug)]
pub enum TransferError {
    /// The underlying transport session is not connected
    #[error("Transport session is not ready")]
    TransportNotReady,

    /// No file channel is open on this engine
    #[error("File transfer channel is not open")]
    NotConnected,

    /// Path, size or extension validation refused the transfer
    #[error("Transfer rejected: {0}")]
    Rejected(#[from] TransferRejection),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A local file or directory could not be read or written
    #[error("Local file error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Streaming to or from the remote side failed
    #[error("Transfer interrupted: {0}")]
    Stream(std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(err: tokio::task::JoinError) -> Self {
        TransferError::Task(err.to_string())
    }
}
