//! Periodic health sweep: reconnects unhealthy subscriptions in the
//! background.

use std::sync::Arc;
use std::time::Duration;

use gagent_kernel::{SchedulerError, TaskScheduler};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::manager::SubscriptionManager;

/// Spawns a background task that, every `interval`, snapshots
/// `manager`'s active subscriptions and calls
/// [`SubscriptionManager::reconnect`] on any that
/// [`SubscriptionManager::is_healthy`] reports as unhealthy.
///
/// # Errors
///
/// Returns [`SchedulerError::Closed`] if `scheduler` has already been
/// closed.
pub fn spawn_health_check(
    manager: Arc<SubscriptionManager>,
    interval: Duration,
    scheduler: &TaskScheduler,
) -> Result<JoinHandle<()>, SchedulerError> {
    scheduler.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for handle in manager.active() {
                if manager.is_healthy(handle) {
                    continue;
                }
                match manager.reconnect(handle) {
                    Ok(()) => debug!(
                        parent = %handle.parent_id(),
                        child = %handle.child_id(),
                        "subscription reconnected"
                    ),
                    Err(err) => warn!(
                        parent = %handle.parent_id(),
                        child = %handle.child_id(),
                        %err,
                        "subscription reconnect failed"
                    ),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gagent_policy::{BackpressurePolicy, RetryPolicy};
    use gagent_primitives::{AgentId, EventEnvelope};
    use gagent_stream::{StreamHandler, StreamRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl StreamHandler for CountingHandler {
        async fn handle(&self, _envelope: EventEnvelope) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn health_check_reconnects_after_parent_stream_is_replaced() {
        let streams = Arc::new(StreamRegistry::new(16, BackpressurePolicy::default()));
        let parent = AgentId::random();
        let child = AgentId::random();
        streams.get_or_create(parent);

        let manager = Arc::new(SubscriptionManager::new(Arc::clone(&streams)));
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler(Arc::clone(&seen)));
        let retry = RetryPolicy::new(3, Duration::from_millis(5), 2.0, Duration::from_millis(20)).unwrap();

        let handle = manager
            .subscribe(parent, child, handler, None, &retry)
            .await
            .unwrap();

        streams.remove(parent);
        let new_stream = streams.get_or_create(parent);
        assert!(!manager.is_healthy(handle));

        let scheduler = TaskScheduler::default();
        let _health_task = spawn_health_check(Arc::clone(&manager), Duration::from_millis(10), &scheduler)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(manager.is_healthy(handle));

        let envelope =
            EventEnvelope::new(parent, "ping", serde_json::json!(null), gagent_primitives::Direction::Down)
                .unwrap();
        new_stream.produce(envelope).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
