//! Command history ring

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::store::{HistoryStore, MemoryHistoryStore};

/// Default number of commands kept
pub const DEFAULT_MAX_SIZE: usize = 100;
/// Smallest accepted history size
pub const MIN_HISTORY_SIZE: usize = 10;
/// Largest accepted history size
pub const MAX_HISTORY_SIZE: usize = 500;

/// Navigable list of past commands, oldest first
///
/// Adding a command that is already present moves it to the end instead of
/// duplicating it. The navigation cursor ranges over `0..=len`, where `len`
/// means "one past the newest entry" (a blank prompt).
pub struct CommandHistory {
    /// Commands, oldest first
    entries: Vec<String>,
    /// Maximum number of commands kept
    max_size: usize,
    /// Navigation position, `entries.len()` when not navigating
    cursor: usize,
    store: Arc<dyn HistoryStore>,
}

impl std::fmt::Debug for CommandHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHistory")
            .field("entries", &self.entries.len())
            .field("max_size", &self.max_size)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl CommandHistory {
    /// Load history from a store. Load failures are logged and yield an empty history.
    pub fn load(store: Arc<dyn HistoryStore>, max_size: usize) -> Self {
        let max_size = clamp_size(max_size);
        let mut entries = match store.load() {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to load command history: {}", e);
                Vec::new()
            }
        };
        entries.retain(|e| !e.trim().is_empty());
        if entries.len() > max_size {
            entries.drain(0..entries.len() - max_size);
        }

        debug!("Loaded {} history entries", entries.len());
        let cursor = entries.len();
        Self {
            entries,
            max_size,
            cursor,
            store,
        }
    }

    /// History that is never written anywhere
    pub fn in_memory(max_size: usize) -> Self {
        Self::load(Arc::new(MemoryHistoryStore::new()), max_size)
    }

    /// Record a command. Blank input is ignored.
    ///
    /// Returns `true` if the history changed.
    pub fn add(&mut self, command: &str) -> bool {
        if command.trim().is_empty() {
            return false;
        }

        self.entries.retain(|e| e != command);
        self.entries.push(command.to_string());
        self.evict();
        self.cursor = self.entries.len();
        self.persist();
        true
    }

    /// Step towards older commands. `None` when history is empty.
    ///
    /// Saturates at the oldest command.
    pub fn navigate_up(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.entries.get(self.cursor).cloned()
    }

    /// Step towards newer commands, landing on an empty prompt past the newest.
    pub fn navigate_down(&mut self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            self.entries[self.cursor].clone()
        } else {
            self.cursor = self.entries.len();
            String::new()
        }
    }

    /// Put the cursor back past the newest command
    pub fn reset_navigation(&mut self) {
        self.cursor = self.entries.len();
    }

    /// Case-insensitive substring search, newest first. Blank queries match nothing.
    pub fn search(&self, query: &str) -> Vec<String> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let query_lower = query.to_lowercase();
        self.entries
            .iter()
            .rev()
            .filter(|e| e.to_lowercase().contains(&query_lower))
            .cloned()
            .collect()
    }

    /// All commands, oldest first
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current navigation position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the size limit (clamped), evicting the oldest commands if needed
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = clamp_size(max_size);
        if self.evict() {
            self.persist();
        }
        self.cursor = self.entries.len();
    }

    /// Drop every command
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.persist();
    }

    fn evict(&mut self) -> bool {
        if self.entries.len() > self.max_size {
            let remove_count = self.entries.len() - self.max_size;
            self.entries.drain(0..remove_count);
            return true;
        }
        false
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.entries) {
            warn!("Failed to persist command history: {}", e);
        }
    }
}

fn clamp_size(max_size: usize) -> usize {
    max_size.clamp(MIN_HISTORY_SIZE, MAX_HISTORY_SIZE)
}
