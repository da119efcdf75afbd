//! Configuration sections

use std::path::PathBuf;
use std::time::Duration;

use remsh_guard::{GuardLimits, TransferValidator};
use remsh_history::DEFAULT_MAX_SIZE;
use remsh_terminal::{EngineOptions, PollConfig};
use remsh_transport::PtyRequest;
use serde::{Deserialize, Serialize};

/// Complete remsh configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RemshConfig {
    pub terminal: TerminalConfig,
    pub polling: PollingConfig,
    pub guard: GuardConfig,
    pub history: HistoryConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
}

/// Terminal engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Output lines kept before the oldest are dropped
    pub max_lines: usize,
    pub prompt: String,
    /// Wait after opening the shell before the first read
    pub shell_settle_ms: u64,
    pub initial_drain_bytes: usize,
    pub read_chunk_bytes: usize,
    pub connect_timeout_secs: u64,
    /// Request a pty for exec-mode commands
    pub pty_enabled: bool,
    /// Try a persistent shell first
    pub shell_mode: bool,
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            max_lines: options.max_lines,
            prompt: options.prompt,
            shell_settle_ms: millis(options.settle_delay),
            initial_drain_bytes: options.initial_drain_bytes,
            read_chunk_bytes: options.read_chunk_bytes,
            connect_timeout_secs: options.connect_timeout.as_secs(),
            pty_enabled: options.pty_enabled,
            shell_mode: options.shell_mode,
            term: options.pty.term,
            cols: options.pty.cols,
            rows: options.pty.rows,
        }
    }
}

/// Adaptive polling settings, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub speedup_step_ms: u64,
    pub slowdown_step_ms: u64,
    /// Empty reads tolerated before polling slows down
    pub idle_threshold: u32,
    pub error_backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            min_interval_ms: millis(poll.min_interval),
            max_interval_ms: millis(poll.max_interval),
            speedup_step_ms: millis(poll.speedup_step),
            slowdown_step_ms: millis(poll.slowdown_step),
            idle_threshold: poll.idle_threshold,
            error_backoff_ms: millis(poll.error_backoff),
        }
    }
}

impl PollingConfig {
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            speedup_step: Duration::from_millis(self.speedup_step_ms),
            slowdown_step: Duration::from_millis(self.slowdown_step_ms),
            idle_threshold: self.idle_threshold,
            error_backoff: Duration::from_millis(self.error_backoff_ms),
        }
    }
}

/// Command guard limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    pub max_command_length: usize,
    pub max_commands_per_window: u32,
    pub window_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        let limits = GuardLimits::default();
        Self {
            max_command_length: limits.max_command_length,
            max_commands_per_window: limits.max_commands_per_window,
            window_ms: millis(limits.window),
        }
    }
}

impl GuardConfig {
    pub fn to_limits(&self) -> GuardLimits {
        GuardLimits {
            max_command_length: self.max_command_length,
            max_commands_per_window: self.max_commands_per_window,
            window: Duration::from_millis(self.window_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Clamped by the history itself to its supported range
    pub max_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    pub max_upload_bytes: u64,
    pub buffer_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: remsh_guard::MAX_UPLOAD_BYTES,
            buffer_size: 32 * 1024,
        }
    }
}

impl TransferConfig {
    pub fn validator(&self) -> TransferValidator {
        TransferValidator::with_max_upload(self.max_upload_bytes)
    }
}

/// Where remsh keeps its local state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("remsh"),
        }
    }
}

impl StorageConfig {
    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn known_hosts_file(&self) -> PathBuf {
        self.data_dir.join("known_hosts.json")
    }

    /// Encrypted credential blobs, keyed by host
    pub fn credentials_file(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }
}

impl RemshConfig {
    /// Terminal engine options assembled from the terminal, polling and guard sections
    pub fn engine_options(&self) -> EngineOptions {
        let terminal = &self.terminal;
        EngineOptions {
            max_lines: terminal.max_lines,
            prompt: terminal.prompt.clone(),
            shell_mode: terminal.shell_mode,
            pty_enabled: terminal.pty_enabled,
            pty: PtyRequest {
                term: terminal.term.clone(),
                cols: terminal.cols,
                rows: terminal.rows,
            },
            settle_delay: Duration::from_millis(terminal.shell_settle_ms),
            initial_drain_bytes: terminal.initial_drain_bytes,
            read_chunk_bytes: terminal.read_chunk_bytes,
            connect_timeout: Duration::from_secs(terminal.connect_timeout_secs),
            polling: self.polling.to_poll_config(),
            guard: self.guard.to_limits(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
