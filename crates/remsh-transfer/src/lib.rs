//! remsh file transfer
//!
//! [`FileTransferEngine`] opens a file channel on a connected transport
//! session and offers listing, upload and download on top of it. Remote
//! destinations and upload sources are validated with
//! [`remsh_guard::TransferValidator`] before any byte moves.

pub mod engine;
pub mod entry;
pub mod error;

pub use engine::{FileTransferEngine, ProgressCallback, TransferProgress, TRANSFER_BUFFER_SIZE};
pub use entry::{listing_order, permissions_summary, RemoteFileEntry};
pub use error::TransferError;

/// Result type for file transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;
