//! Observable engine state

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::output::OutputBuffer;

/// What the engine is currently able to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    Disconnected,
    Connecting,
    /// Persistent shell with a pty, output arrives through the poller
    ShellActive,
    /// One-shot execution per command
    ExecReady { pty_enabled: bool },
}

impl SessionMode {
    pub fn is_connected(self) -> bool {
        matches!(self, SessionMode::ShellActive | SessionMode::ExecReady { .. })
    }
}

/// Snapshot published to observers after every change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    pub mode: SessionMode,
    /// `user@host` of the attached session
    pub host_label: Option<String>,
    pub output: OutputBuffer,
    /// Contents of the command input field
    pub input: String,
    /// Current poller delay while a shell is active
    pub poll_interval: Option<Duration>,
}

impl EngineState {
    pub fn new(max_lines: usize) -> Self {
        Self {
            mode: SessionMode::Disconnected,
            host_label: None,
            output: OutputBuffer::new(max_lines),
            input: String::new(),
            poll_interval: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.mode.is_connected()
    }
}
