//! Master key storage
//!
//! A [`KeyStore`] owns named 256-bit keys and performs AES-GCM operations with
//! them in place. Key material never crosses the trait boundary: callers hand
//! in a nonce and data and get sealed or opened bytes back.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info};

use crate::{Result, VaultError};

/// Master key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// Secure holder of named, non-exportable master keys
pub trait KeyStore: Send + Sync {
    /// Check whether a key exists under `alias`
    fn contains(&self, alias: &str) -> Result<bool>;

    /// Create a fresh random key under `alias`, replacing nothing if one exists
    fn generate(&self, alias: &str) -> Result<()>;

    /// Encrypt with the key under `alias`; output is ciphertext followed by the 128-bit tag
    fn seal(&self, alias: &str, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt and authenticate with the key under `alias`
    fn open(&self, alias: &str, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Irreversibly delete the key under `alias`
    fn delete(&self, alias: &str) -> Result<()>;
}

fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

// A new cipher instance per call; instances are never shared between callers.
fn seal_with(key: &[u8], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::KeyStore {
        message: e.to_string(),
    })?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| VaultError::Encryption {
            message: e.to_string(),
        })
}

fn open_with(key: &[u8], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::DecryptionFailed)
}

/// In-process key store, keys live only as long as the store
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, [u8; KEY_LEN]>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("keys", &self.keys.read().len())
            .finish()
    }
}

impl KeyStore for MemoryKeyStore {
    fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.keys.read().contains_key(alias))
    }

    fn generate(&self, alias: &str) -> Result<()> {
        self.keys
            .write()
            .entry(alias.to_string())
            .or_insert_with(random_key);
        Ok(())
    }

    fn seal(&self, alias: &str, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.read();
        let key = keys.get(alias).ok_or_else(|| VaultError::KeyUnavailable {
            alias: alias.to_string(),
        })?;
        seal_with(key, nonce, plaintext)
    }

    fn open(&self, alias: &str, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.read();
        let key = keys.get(alias).ok_or_else(|| VaultError::KeyUnavailable {
            alias: alias.to_string(),
        })?;
        open_with(key, nonce, ciphertext)
    }

    fn delete(&self, alias: &str) -> Result<()> {
        self.keys.write().remove(alias);
        Ok(())
    }
}

/// Key store backed by owner-only key files in a private directory
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (and create if needed) a key directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        restrict_permissions(&dir, 0o700)?;
        debug!("FileKeyStore initialized at {:?}", dir);
        Ok(Self { dir })
    }

    /// Directory holding the key files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, alias: &str) -> Result<PathBuf> {
        let valid = !alias.is_empty()
            && alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(VaultError::KeyStore {
                message: format!("invalid key alias: {:?}", alias),
            });
        }
        Ok(self.dir.join(format!("{}.key", alias)))
    }

    fn read_key(&self, alias: &str) -> Result<Vec<u8>> {
        let path = self.key_path(alias)?;
        match fs::read(&path) {
            Ok(bytes) if bytes.len() == KEY_LEN => Ok(bytes),
            Ok(_) => Err(VaultError::KeyStore {
                message: format!("corrupt key file {:?}", path),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::KeyUnavailable {
                    alias: alias.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.key_path(alias)?.is_file())
    }

    fn generate(&self, alias: &str) -> Result<()> {
        let path = self.key_path(alias)?;
        if path.is_file() {
            return Ok(());
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        file.write_all(&random_key())?;
        file.sync_all()?;

        info!(alias = %alias, "Created master key");
        Ok(())
    }

    fn seal(&self, alias: &str, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.read_key(alias)?;
        seal_with(&key, nonce, plaintext)
    }

    fn open(&self, alias: &str, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.read_key(alias)?;
        open_with(&key, nonce, ciphertext)
    }

    fn delete(&self, alias: &str) -> Result<()> {
        let path = self.key_path(alias)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(alias = %alias, "Deleted master key");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_seal_open() {
        let store = MemoryKeyStore::new();
        store.generate("k").unwrap();
        let nonce = [7u8; NONCE_LEN];

        let sealed = store.seal("k", &nonce, b"secret").unwrap();
        assert_eq!(sealed.len(), b"secret".len() + 16);
        assert_eq!(store.open("k", &nonce, &sealed).unwrap(), b"secret");
    }

    #[test]
    fn test_generate_is_idempotent() {
        let store = MemoryKeyStore::new();
        store.generate("k").unwrap();
        let nonce = [1u8; NONCE_LEN];
        let sealed = store.seal("k", &nonce, b"x").unwrap();

        store.generate("k").unwrap();
        assert_eq!(store.open("k", &nonce, &sealed).unwrap(), b"x");
    }

    #[test]
    fn test_missing_key_is_unavailable() {
        let store = MemoryKeyStore::new();
        let err = store.seal("nope", &[0u8; NONCE_LEN], b"x").unwrap_err();
        assert!(matches!(err, VaultError::KeyUnavailable { .. }));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let nonce = [3u8; NONCE_LEN];

        let sealed = {
            let store = FileKeyStore::open(dir.path()).unwrap();
            store.generate("master").unwrap();
            store.seal("master", &nonce, b"pw").unwrap()
        };

        let reopened = FileKeyStore::open(dir.path()).unwrap();
        assert!(reopened.contains("master").unwrap());
        assert_eq!(reopened.open("master", &nonce, &sealed).unwrap(), b"pw");
    }

    #[test]
    fn test_file_store_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        store.generate("master").unwrap();
        store.delete("master").unwrap();

        assert!(!store.contains("master").unwrap());
        assert!(store.delete("master").is_ok());
    }

    #[test]
    fn test_file_store_rejects_path_alias() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        assert!(store.generate("../escape").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        store.generate("master").unwrap();

        let mode = fs::metadata(dir.path().join("master.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
