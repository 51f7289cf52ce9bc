//! Reconnect back-off policy for persistent transports.
//!
//! # Strategy
//!
//! - Attempt `n` (1-based) is scheduled `n × delay` after the failure that
//!   triggered it (linear back-off).
//! - At most `max_attempts` reconnects are scheduled in a row; the next
//!   failure is terminal.
//! - A successful connect resets the attempt counter.

use std::time::Duration;

/// Linear reconnect back-off with an attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Base delay multiplied by the attempt number.
    pub delay: Duration,

    /// Maximum consecutive reconnect attempts (0 = never reconnect).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    /// - `delay`: 1s
    /// - `max_attempts`: 5
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    // ---
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Delay before the given 1-based attempt, or `None` once the cap is exceeded.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.delay.saturating_mul(attempt))
    }
}

/// Consecutive-failure counter driven by a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Record a failure; returns the attempt number and its delay, or `None`
    /// when no further attempt is allowed.
    pub(crate) fn next(&mut self) -> Option<(u32, Duration)> {
        let attempt = self.attempt.saturating_add(1);
        let delay = self.policy.delay_for(attempt)?;
        self.attempt = attempt;
        Some((attempt, delay))
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    #[cfg(test)]
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }
}
