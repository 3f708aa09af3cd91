//! Exponential reconnect backoff.

use std::time::Duration;

/// `delay(attempt) = base * 2^(attempt - 1)` for `attempt` in `1..=max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before the 1-based `attempt`, or `None` once attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1)?;
        self.base_delay.checked_mul(factor)
    }
}
