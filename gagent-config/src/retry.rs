//! Default retry-policy knobs (spec §6), consumed by subscribe/reconnect.

use std::time::Duration;

use gagent_policy::{PolicyError, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Process-wide default retry knobs. Individual subscriptions may still
/// be given an explicit [`RetryPolicy`] that overrides these.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryKnobs {
    /// Maximum attempts before a retry loop gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Exponential backoff multiplier applied per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Cap on the computed delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    100
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_secs() -> u64 {
    30
}

impl Default for RetryKnobs {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryKnobs {
    /// Builds the [`RetryPolicy`] these knobs describe.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ZeroAttempts`] if `max_attempts` is 0.
    pub fn to_retry_policy(&self) -> Result<RetryPolicy, PolicyError> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
            Duration::from_secs(self.max_delay_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_a_valid_policy() {
        RetryKnobs::default().to_retry_policy().unwrap();
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut knobs = RetryKnobs::default();
        knobs.max_attempts = 0;
        assert!(knobs.to_retry_policy().is_err());
    }
}
