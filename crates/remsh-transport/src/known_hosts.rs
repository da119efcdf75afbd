//! Trust-on-first-use host key pinning

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::Result;

/// Outcome of checking a presented host key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// Matches the pinned fingerprint
    Trusted,
    /// First contact; the fingerprint is now pinned
    NewlyTrusted,
    /// Differs from the pinned fingerprint
    Mismatch { expected: String },
}

/// Pinned `address:port → fingerprint` map persisted as JSON
#[derive(Debug)]
pub struct KnownHosts {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KnownHosts {
    /// Load pins from a file. A missing file starts empty; a corrupt one is
    /// logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    error!("Failed to parse known hosts {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} known hosts from {:?}", entries.len(), path);
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Pins that live only as long as this value
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check a fingerprint, pinning it on first contact
    pub fn verify(&self, endpoint: &str, fingerprint: &str) -> Result<HostKeyStatus> {
        let mut entries = self.entries.lock();
        match entries.get(endpoint) {
            Some(pinned) if pinned == fingerprint => Ok(HostKeyStatus::Trusted),
            Some(pinned) => {
                warn!(endpoint, expected = %pinned, actual = %fingerprint, "Host key mismatch");
                Ok(HostKeyStatus::Mismatch {
                    expected: pinned.clone(),
                })
            }
            None => {
                entries.insert(endpoint.to_string(), fingerprint.to_string());
                self.flush(&entries)?;
                info!(endpoint, fingerprint, "Pinned new host key");
                Ok(HostKeyStatus::NewlyTrusted)
            }
        }
    }

    /// Verify and turn a mismatch into an error
    pub fn check(&self, endpoint: &str, fingerprint: &str) -> Result<HostKeyStatus> {
        match self.verify(endpoint, fingerprint)? {
            HostKeyStatus::Mismatch { expected } => Err(TransportError::HostKeyMismatch {
                endpoint: endpoint.to_string(),
                expected,
                actual: fingerprint.to_string(),
            }),
            status => Ok(status),
        }
    }

    pub fn fingerprint(&self, endpoint: &str) -> Option<String> {
        self.entries.lock().get(endpoint).cloned()
    }

    /// Drop a pin. Returns whether one existed.
    pub fn forget(&self, endpoint: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        if entries.remove(endpoint).is_none() {
            return Ok(false);
        }
        self.flush(&entries)?;
        Ok(true)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(path, json).map_err(|e| {
            TransportError::KnownHosts(format!("failed to write {}: {}", path.display(), e))
        })
    }
}
