//! Retry policy for subscription reconnect and similar transient-error
//! recovery paths.

use std::time::Duration;

use thiserror::Error;

/// Errors raised constructing a [`RetryPolicy`].
#[derive(Debug, Error)]
pub enum PolicyError {
    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
}

/// Exponential-backoff retry policy.
///
/// The backoff computation doubles `initial_delay` per attempt, capped at
/// `max_delay`, mirroring the teacher's registration-loop backoff.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ZeroAttempts`] if `max_attempts` is 0.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay,
        })
    }

    /// A reasonable default: 5 attempts, 100ms initial delay, 2x backoff,
    /// capped at 30s.
    #[must_use]
    pub fn default_policy() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Returns the maximum number of attempts before giving up.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait before the given 1-indexed attempt
    /// number, growing exponentially and capped at `max_delay`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }

    /// Returns whether a failed attempt should be retried. Attempts are
    /// 1-indexed; retrying stops once `attempt >= max_attempts`.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
