//! Adaptive polling interval

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for the shell output poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Fastest polling rate
    pub min_interval: Duration,
    /// Slowest polling rate
    pub max_interval: Duration,
    /// Decrease applied after a read that returned output
    pub speedup_step: Duration,
    /// Increase applied per empty read once idle
    pub slowdown_step: Duration,
    /// Empty reads tolerated before slowing down
    pub idle_threshold: u32,
    /// Pause after a failed read
    pub error_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(500),
            speedup_step: Duration::from_millis(10),
            slowdown_step: Duration::from_millis(20),
            idle_threshold: 5,
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Interval and idle streak of one poller
///
/// Output speeds polling up by a small step; once more than
/// `idle_threshold` reads in a row came back empty, each further empty read
/// slows it down by a larger step. The interval stays within
/// `[min_interval, max_interval]` and starts at the minimum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    config: PollConfig,
    interval: Duration,
    empty_streak: u32,
}

impl PollState {
    pub fn new(config: PollConfig) -> Self {
        Self {
            interval: config.min_interval,
            config,
            empty_streak: 0,
        }
    }

    /// Record a read that returned output
    pub fn on_output(&mut self) {
        self.empty_streak = 0;
        self.interval = self
            .interval
            .saturating_sub(self.config.speedup_step)
            .max(self.config.min_interval);
    }

    /// Record a read that returned nothing
    pub fn on_empty(&mut self) {
        self.empty_streak = self.empty_streak.saturating_add(1);
        if self.empty_streak > self.config.idle_threshold {
            self.interval = (self.interval + self.config.slowdown_step).min(self.config.max_interval);
        }
    }

    /// Delay before the next read
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn empty_streak(&self) -> u32 {
        self.empty_streak
    }

    pub fn error_backoff(&self) -> Duration {
        self.config.error_backoff
    }
}

impl Default for PollState {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}
