//! Shared handles built from the loaded configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use remsh_config::RemshConfig;
use remsh_history::{CommandHistory, DeferredHistoryStore, HistoryStore, JsonFileHistoryStore};
use remsh_vault::{CredentialStore, CredentialVault, FileKeyStore};

/// Everything a command needs to reach local state
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: RemshConfig,
}

impl AppContext {
    pub fn new(config: RemshConfig) -> Self {
        Self { config }
    }

    /// Vault on the master key in the configured key directory
    pub fn vault(&self) -> Result<CredentialVault> {
        let keys_dir = self.config.storage.keys_dir();
        let keystore = FileKeyStore::open(&keys_dir)
            .with_context(|| format!("Failed to open key store at {}", keys_dir.display()))?;
        CredentialVault::new(Arc::new(keystore)).context("Failed to initialize credential vault")
    }

    pub fn credential_store(&self) -> Result<CredentialStore> {
        let path = self.config.storage.credentials_file();
        CredentialStore::open(&path)
            .with_context(|| format!("Failed to open credential store at {}", path.display()))
    }

    /// History persisted to the configured file
    ///
    /// Inside a tokio runtime saves are moved off the calling thread.
    pub fn history(&self, deferred: bool) -> CommandHistory {
        let file: Arc<dyn HistoryStore> =
            Arc::new(JsonFileHistoryStore::new(self.config.storage.history_file()));
        let store: Arc<dyn HistoryStore> = if deferred {
            Arc::new(DeferredHistoryStore::new(file))
        } else {
            file
        };
        CommandHistory::load(store, self.config.history.max_size)
    }
}
