//! Configuration loading, validation and persistence

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::types::RemshConfig;

/// Environment prefix for overrides, e.g. `REMSH_TERMINAL__PROMPT`
pub const ENV_PREFIX: &str = "REMSH";

/// Loads [`RemshConfig`] from a TOML file layered under environment overrides
pub struct ConfigManager {
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Use a different environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// `<config dir>/remsh/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remsh")
            .join("config.toml")
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate the configuration
    ///
    /// A missing file is not an error; every value then comes from the
    /// environment or the defaults.
    pub fn load(&self) -> Result<RemshConfig> {
        let config = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: RemshConfig = config.try_deserialize()?;
        self.validate(&loaded)?;
        debug!(path = ?self.config_path, "Configuration loaded");
        Ok(loaded)
    }

    /// Write the configuration as TOML, creating the parent directory
    pub fn save(&self, config: &RemshConfig) -> Result<()> {
        self.validate(config)?;
        let toml = toml::to_string_pretty(config)?;
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.config_path, toml)?;
        info!(path = ?self.config_path, "Configuration saved");
        Ok(())
    }

    pub fn validate(&self, config: &RemshConfig) -> Result<()> {
        let terminal = &config.terminal;
        require(terminal.max_lines > 0, "terminal.max_lines must be greater than 0")?;
        require(
            terminal.read_chunk_bytes > 0,
            "terminal.read_chunk_bytes must be greater than 0",
        )?;
        require(
            terminal.initial_drain_bytes > 0,
            "terminal.initial_drain_bytes must be greater than 0",
        )?;
        require(
            terminal.connect_timeout_secs > 0,
            "terminal.connect_timeout_secs must be greater than 0",
        )?;
        require(
            terminal.cols > 0 && terminal.rows > 0,
            "terminal.cols and terminal.rows must be greater than 0",
        )?;
        require(!terminal.term.trim().is_empty(), "terminal.term cannot be empty")?;

        let polling = &config.polling;
        require(
            polling.min_interval_ms > 0,
            "polling.min_interval_ms must be greater than 0",
        )?;
        require(
            polling.min_interval_ms <= polling.max_interval_ms,
            "polling.min_interval_ms cannot exceed polling.max_interval_ms",
        )?;

        let guard = &config.guard;
        require(
            guard.max_command_length > 0,
            "guard.max_command_length must be greater than 0",
        )?;
        require(
            guard.max_commands_per_window > 0,
            "guard.max_commands_per_window must be greater than 0",
        )?;
        require(guard.window_ms > 0, "guard.window_ms must be greater than 0")?;

        require(
            config.transfer.max_upload_bytes > 0,
            "transfer.max_upload_bytes must be greater than 0",
        )?;
        require(
            config.transfer.buffer_size > 0,
            "transfer.buffer_size must be greater than 0",
        )?;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn require(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}
