//! Vault error types

use thiserror::Error;

/// Credential vault errors
///
/// Authentication failures are reported as a single opaque
/// [`VaultError::DecryptionFailed`] whatever part of the check failed.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Master key '{alias}' is not available")]
    KeyUnavailable { alias: String },

    #[error("Key store error: {message}")]
    KeyStore { message: String },

    #[error("Encryption error: {message}")]
    Encryption { message: String },

    #[error("Malformed ciphertext")]
    MalformedCiphertext,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// True for tampering, wrong key, or malformed input
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Self::MalformedCiphertext | Self::DecryptionFailed)
    }
}
