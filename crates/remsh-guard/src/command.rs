//! Command validation and rate limiting

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CommandRejection;

/// Longest command accepted, in characters
pub const MAX_COMMAND_LENGTH: usize = 10_000;

/// Commands accepted per rate window
pub const MAX_COMMANDS_PER_WINDOW: u32 = 10;

/// Length of one rate window
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Tunable limits for a [`CommandGuard`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardLimits {
    pub max_command_length: usize,
    pub max_commands_per_window: u32,
    pub window: Duration,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            max_command_length: MAX_COMMAND_LENGTH,
            max_commands_per_window: MAX_COMMANDS_PER_WINDOW,
            window: RATE_WINDOW,
        }
    }
}

/// Per-session command gate
///
/// Checks run in a fixed order (length, rate, blankness) and only the first
/// failure is reported. The rate counter is a fixed window that restarts once
/// more than one window has elapsed since it last restarted.
#[derive(Debug, Clone)]
pub struct CommandGuard {
    limits: GuardLimits,
    window_start: Option<Instant>,
    count: u32,
}

impl CommandGuard {
    /// Guard with the default limits
    pub fn new() -> Self {
        Self::with_limits(GuardLimits::default())
    }

    pub fn with_limits(limits: GuardLimits) -> Self {
        Self {
            limits,
            window_start: None,
            count: 0,
        }
    }

    pub fn limits(&self) -> &GuardLimits {
        &self.limits
    }

    /// Validate a command submitted now
    pub fn check(&mut self, command: &str) -> Result<(), CommandRejection> {
        self.check_at(command, Instant::now())
    }

    /// Validate a command submitted at `now`
    pub fn check_at(&mut self, command: &str, now: Instant) -> Result<(), CommandRejection> {
        let length = command.chars().count();
        if length > self.limits.max_command_length {
            return Err(CommandRejection::CommandTooLong {
                length,
                max: self.limits.max_command_length,
            });
        }

        match self.window_start {
            Some(start) if now.saturating_duration_since(start) <= self.limits.window => {}
            _ => {
                self.window_start = Some(now);
                self.count = 0;
            }
        }
        self.count += 1;
        if self.count > self.limits.max_commands_per_window {
            debug!(count = self.count, "Command rate limit hit");
            return Err(CommandRejection::RateLimited {
                limit: self.limits.max_commands_per_window,
                window_ms: self.limits.window.as_millis() as u64,
            });
        }

        if command.trim().is_empty() {
            return Err(CommandRejection::EmptyCommand);
        }

        Ok(())
    }
}

impl Default for CommandGuard {
    fn default() -> Self {
        Self::new()
    }
}
