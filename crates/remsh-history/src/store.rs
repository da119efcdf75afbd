//! History persistence backends

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::Result;

/// Durable storage for the serialized command list
pub trait HistoryStore: Send + Sync {
    /// Read the stored commands, oldest first
    fn load(&self) -> Result<Vec<String>>;

    /// Replace the stored commands
    fn save(&self, entries: &[String]) -> Result<()>;
}

/// Stores history as a compact JSON array in a single file
#[derive(Debug, Clone)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path)?;
        let entries: Vec<String> = serde_json::from_str(&json)?;
        debug!("History loaded from {:?}", self.path);
        Ok(entries)
    }

    fn save(&self, entries: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Keeps the last saved list in memory
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<String>>,
    saves: AtomicU64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing list
    pub fn with_entries(entries: Vec<String>) -> Self {
        Self {
            entries: Mutex::new(entries),
            saves: AtomicU64::new(0),
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last saved list
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().clone())
    }

    fn save(&self, entries: &[String]) -> Result<()> {
        *self.entries.lock() = entries.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Moves saves of another store onto the blocking pool of a tokio runtime
///
/// `save` returns immediately. A save that finishes after a newer one has
/// already been written is discarded, so the newest list always wins.
pub struct DeferredHistoryStore {
    inner: Arc<dyn HistoryStore>,
    runtime: Option<Handle>,
    issued: Arc<AtomicU64>,
    written: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for DeferredHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredHistoryStore")
            .field("background", &self.runtime.is_some())
            .field("issued", &self.issued.load(Ordering::SeqCst))
            .finish()
    }
}

impl DeferredHistoryStore {
    /// Wrap a store. Outside a tokio runtime saves stay synchronous.
    pub fn new(inner: Arc<dyn HistoryStore>) -> Self {
        Self {
            inner,
            runtime: Handle::try_current().ok(),
            issued: Arc::new(AtomicU64::new(0)),
            written: Arc::new(Mutex::new(0)),
        }
    }
}

impl HistoryStore for DeferredHistoryStore {
    fn load(&self) -> Result<Vec<String>> {
        self.inner.load()
    }

    fn save(&self, entries: &[String]) -> Result<()> {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(runtime) = self.runtime.as_ref() else {
            return self.inner.save(entries);
        };

        let inner = Arc::clone(&self.inner);
        let written = Arc::clone(&self.written);
        let snapshot = entries.to_vec();
        runtime.spawn_blocking(move || {
            let mut last = written.lock();
            if *last > generation {
                return;
            }
            match inner.save(&snapshot) {
                Ok(()) => *last = generation,
                Err(e) => warn!("Background history save failed: {}", e),
            }
        });
        Ok(())
    }
}
