//! Backpressure policy for bounded per-agent streams.

use std::time::Duration;

/// Governs what a bounded stream producer does when the stream is full:
/// block until space frees up or `deadline` elapses, then drop the
/// envelope and increment a counter.
#[derive(Clone, Copy, Debug)]
pub struct BackpressurePolicy {
    deadline: Duration,
}

impl BackpressurePolicy {
    /// Creates a policy with the given block deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Returns the maximum time a producer blocks before dropping.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_nonzero_deadline() {
        assert!(BackpressurePolicy::default().deadline() > Duration::ZERO);
    }
}
