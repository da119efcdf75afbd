//! remsh command history
//!
//! A recency-ordered, de-duplicated, size-bounded list of accepted commands
//! with cursor navigation and pluggable persistence.

pub mod error;
pub mod history;
pub mod store;

pub use error::{HistoryError, Result};
pub use history::{CommandHistory, DEFAULT_MAX_SIZE, MAX_HISTORY_SIZE, MIN_HISTORY_SIZE};
pub use store::{DeferredHistoryStore, HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
