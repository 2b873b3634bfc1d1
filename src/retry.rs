//! Client link reconnect policy
//!
//! `wait(attempt) = base_delay << min(attempt, max_shift)`. The shift ceiling
//! bounds both the longest wait and the integer width.

use crate::config::RetrySettings;
use std::time::Duration;

/// Hard upper bound on the configurable shift
const SHIFT_LIMIT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts; negative means unlimited
    max_retries: i32,
    base_delay: Duration,
    max_shift: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: i32, base_delay: Duration, max_shift: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            max_shift: max_shift.min(SHIFT_LIMIT),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_retries, settings.base_delay(), settings.max_backoff_shift)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_retries < 0
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows(&self, attempts: u32) -> bool {
        self.is_unlimited() || i64::from(attempts) < i64::from(self.max_retries)
    }

    /// Wait before attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.min(self.max_shift);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Longest wait this policy can produce
    pub fn max_backoff(&self) -> Duration {
        self.backoff(self.max_shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Attempt counter for the client link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a new attempt and return its number
    pub fn next_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
