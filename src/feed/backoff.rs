//! Reconnect backoff policies
//!
//! Policy objects own the delay schedule but never sleep themselves, so a
//! schedule can be exercised in tests without a clock.

use std::time::Duration;

/// Delay schedule for retrying a failed operation
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    exponential: bool,
    attempts: u32,
}

impl Backoff {
    /// Fixed interval between attempts
    pub fn fixed(interval: Duration) -> Self {
        Self {
            base: interval,
            max: interval,
            exponential: false,
            attempts: 0,
        }
    }

    /// Doubling interval starting at `base`, capped at `max`
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            exponential: true,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, advancing the schedule
    pub fn next(&mut self) -> Duration {
        let delay = if self.exponential {
            self.base
                .saturating_mul(2u32.saturating_pow(self.attempts.min(16)))
                .min(self.max)
        } else {
            self.base
        };
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Restart the schedule after a healthy run
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
