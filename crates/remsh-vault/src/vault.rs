//! Credential encryption and decryption

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use crate::keystore::{KeyStore, NONCE_LEN};
use crate::{Result, VaultError};

/// Name of the master key used unless a vault is built with another alias
pub const MASTER_KEY_ALIAS: &str = "remsh_master_key";

/// Separator between the encoded nonce and the encoded ciphertext.
/// Never produced by the standard base64 alphabet.
pub const SEPARATOR: &str = "]|[";

/// Encrypts and decrypts small secrets with a device-held master key
///
/// Blobs have the form `base64(nonce) + "]|[" + base64(ciphertext || tag)`.
/// Every call draws a fresh 96-bit nonce, so the vault can be shared freely
/// between tasks without any locking of its own.
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn KeyStore>,
    alias: String,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Create a vault on the default master key, creating the key if absent
    pub fn new(store: Arc<dyn KeyStore>) -> Result<Self> {
        Self::with_alias(store, MASTER_KEY_ALIAS)
    }

    /// Create a vault on a named master key, creating the key if absent
    pub fn with_alias(store: Arc<dyn KeyStore>, alias: impl Into<String>) -> Result<Self> {
        let vault = Self {
            store,
            alias: alias.into(),
        };
        vault.ensure_key()?;
        Ok(vault)
    }

    /// Name of the master key this vault uses
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Whether the master key currently exists
    pub fn has_key(&self) -> Result<bool> {
        self.store.contains(&self.alias)
    }

    /// Create the master key if it does not exist yet
    pub fn ensure_key(&self) -> Result<()> {
        if !self.store.contains(&self.alias)? {
            debug!(alias = %self.alias, "Generating master key");
            self.store.generate(&self.alias)?;
        }
        Ok(())
    }

    /// Encrypt a secret. Empty input maps to empty output.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Self::generate_nonce();
        let sealed = self.store.seal(&self.alias, &nonce, plaintext.as_bytes())?;

        Ok(format!(
            "{}{}{}",
            general_purpose::STANDARD.encode(nonce),
            SEPARATOR,
            general_purpose::STANDARD.encode(sealed)
        ))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt). Empty input maps to empty output.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        if blob.is_empty() {
            return Ok(String::new());
        }

        let parts: Vec<&str> = blob.split(SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(VaultError::MalformedCiphertext);
        }

        let nonce_bytes = general_purpose::STANDARD
            .decode(parts[0])
            .map_err(|_| VaultError::MalformedCiphertext)?;
        let ciphertext = general_purpose::STANDARD
            .decode(parts[1])
            .map_err(|_| VaultError::MalformedCiphertext)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::MalformedCiphertext)?;

        let plaintext = self
            .store
            .open(&self.alias, &nonce, &ciphertext)
            .map_err(|e| match e {
                VaultError::KeyUnavailable { .. } => e,
                _ => {
                    warn!(alias = %self.alias, "Credential failed authentication");
                    VaultError::DecryptionFailed
                }
            })?;

        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
    }

    /// Irreversibly delete the master key. Encrypt and decrypt fail until
    /// [`ensure_key`](Self::ensure_key) creates a new one.
    pub fn clear_keys(&self) -> Result<()> {
        self.store.delete(&self.alias)
    }

    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}
