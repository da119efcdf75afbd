//! Rejection reasons reported by the guards

use std::path::PathBuf;

use thiserror::Error;

/// Why a command was refused before being sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandRejection {
    #[error("Command too long: {length} characters (max {max})")]
    CommandTooLong { length: usize, max: usize },

    #[error("Rate limited: more than {limit} commands in {window_ms}ms")]
    RateLimited { limit: u32, window_ms: u64 },

    #[error("Command cannot be empty")]
    EmptyCommand,
}

/// Why a file transfer target or source was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferRejection {
    #[error("Path traversal not allowed: {0}")]
    PathTraversal(String),

    #[error("Absolute paths not allowed: {0}")]
    AbsolutePath(String),

    #[error("Invalid character {0:?} in path")]
    InvalidCharacter(char),

    #[error("Hidden files not allowed: {0}")]
    HiddenFile(String),

    #[error("File name cannot be empty")]
    EmptyFileName,

    #[error("Local file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Local file not readable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File has no extension")]
    MissingExtension,

    #[error("File extension not allowed: {0}")]
    ExtensionNotAllowed(String),
}
