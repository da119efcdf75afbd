//! remsh configuration
//!
//! [`RemshConfig`] collects the tunables of every remsh component. It is
//! read from `<config dir>/remsh/config.toml` and can be overridden per key
//! through `REMSH_<SECTION>__<KEY>` environment variables.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::{ConfigManager, ENV_PREFIX};
pub use types::{
    GuardConfig, HistoryConfig, PollingConfig, RemshConfig, StorageConfig, TerminalConfig,
    TransferConfig,
};
