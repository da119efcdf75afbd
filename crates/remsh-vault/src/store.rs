//! Persistence of encrypted credential blobs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::keystore::restrict_permissions;
use crate::{CredentialVault, Result};

/// Durable map of host id to encrypted blob
///
/// Only ciphertext ever reaches disk; [`store_secret`](Self::store_secret)
/// encrypts through the vault before writing.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl CredentialStore {
    /// Open a store file, starting empty if it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    error!("Failed to parse credential store {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("CredentialStore loaded {} entries from {:?}", entries.len(), path);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store an already-encrypted blob
    pub fn put(&self, id: &str, blob: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(id.to_string(), blob.to_string());
        self.flush(&entries)
    }

    /// Encrypt a secret and store the resulting blob
    pub fn store_secret(&self, vault: &CredentialVault, id: &str, secret: &str) -> Result<()> {
        let blob = vault.encrypt(secret)?;
        self.put(id, &blob)?;
        info!(id = %id, "Stored credential");
        Ok(())
    }

    /// Fetch and decrypt a secret
    pub fn load_secret(&self, vault: &CredentialVault, id: &str) -> Result<Option<String>> {
        match self.get(id) {
            Some(blob) => vault.decrypt(&blob).map(Some),
            None => Ok(None),
        }
    }

    /// Encrypted blob for an id
    pub fn get(&self, id: &str) -> Option<String> {
        self.entries.lock().get(id).cloned()
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        let existed = entries.remove(id).is_some();
        if existed {
            self.flush(&entries)?;
        }
        Ok(existed)
    }

    /// All stored ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;
        restrict_permissions(&self.path, 0o600)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKeyStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_load_secret() {
        let dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(Arc::new(MemoryKeyStore::new())).unwrap();
        let store = CredentialStore::open(dir.path().join("credentials.json")).unwrap();

        store.store_secret(&vault, "prod-db", "s3cret").unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("s3cret"));
        assert_eq!(
            store.load_secret(&vault, "prod-db").unwrap().as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");

        CredentialStore::open(&path).unwrap().put("a", "blob-a").unwrap();
        let reopened = CredentialStore::open(&path).unwrap();

        assert_eq!(reopened.get("a").as_deref(), Some("blob-a"));
        assert_eq!(reopened.ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "not json").unwrap();

        let store = CredentialStore::open(&path).unwrap();
        assert!(store.ids().is_empty());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path().join("c.json")).unwrap();
        store.put("a", "x").unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(store.get("a").is_none());
    }
}
