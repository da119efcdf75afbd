//! # remsh Vault
//!
//! Credential protection at rest for remsh.
//!
//! This crate provides:
//! - A [`KeyStore`] seam holding non-exportable master keys
//! - [`CredentialVault`] for AES-256-GCM encryption of small secrets
//! - [`CredentialStore`] for persisting already-encrypted blobs per host
//!
//! ```rust
//! use std::sync::Arc;
//! use remsh_vault::{CredentialVault, MemoryKeyStore};
//!
//! let vault = CredentialVault::new(Arc::new(MemoryKeyStore::new())).unwrap();
//! let blob = vault.encrypt("hunter2").unwrap();
//! assert_eq!(vault.decrypt(&blob).unwrap(), "hunter2");
//! ```

pub mod error;
pub mod keystore;
pub mod store;
pub mod vault;

pub use error::VaultError;
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore, KEY_LEN, NONCE_LEN};
pub use store::CredentialStore;
pub use vault::{CredentialVault, MASTER_KEY_ALIAS, SEPARATOR};

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;
