//! Registry of live parent/child subscriptions, with retrying connect and
//! reconnect-after-failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gagent_policy::RetryPolicy;
use gagent_primitives::AgentId;
use gagent_stream::{MessageStream, StreamHandler, StreamRegistry, Subscription, TypeFilter};

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::filter::{AncestorObserverHandler, LoopSafeHandler};

/// Opaque reference to one parent/child subscription, returned by
/// [`SubscriptionManager::subscribe`] and accepted by every other manager
/// operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionHandle {
    parent_id: AgentId,
    child_id: AgentId,
}

impl SubscriptionHandle {
    /// Returns the parent side of this subscription.
    #[must_use]
    pub fn parent_id(&self) -> AgentId {
        self.parent_id
    }

    /// Returns the child side of this subscription.
    #[must_use]
    pub fn child_id(&self) -> AgentId {
        self.child_id
    }
}

struct LiveSubscription {
    subscription: Subscription,
    stream: Arc<MessageStream>,
    handler: Arc<dyn StreamHandler>,
    filter: Option<TypeFilter>,
}

/// Owns every live parent/child subscription in the process, keyed by
/// `(parent_id, child_id)`.
pub struct SubscriptionManager {
    streams: Arc<StreamRegistry>,
    live: Mutex<HashMap<(AgentId, AgentId), LiveSubscription>>,
    parent_of: Mutex<HashMap<AgentId, AgentId>>,
}

impl SubscriptionManager {
    /// Creates a manager that resolves parent streams through `streams`.
    #[must_use]
    pub fn new(streams: Arc<StreamRegistry>) -> Self {
        Self {
            streams,
            live: Mutex::new(HashMap::new()),
            parent_of: Mutex::new(HashMap::new()),
        }
    }

    /// Walks the existing parent chain starting at `start`, returning the
    /// first ancestor equal to `target`, if any.
    fn find_ancestor(&self, start: AgentId, target: AgentId) -> Option<AgentId> {
        let parent_of = self.parent_of.lock().expect("subscription registry poisoned");
        let mut current = start;
        let mut steps = 0;
        while let Some(&next) = parent_of.get(&current) {
            if next == target {
                return Some(next);
            }
            current = next;
            steps += 1;
            if steps > parent_of.len() {
                break;
            }
        }
        None
    }

    /// Subscribes `child_id` to `parent_id`'s stream.
    ///
    /// Retries locating the parent's stream according to `retry`, then
    /// wraps `handler` with the loop-safety filter (drop envelopes
    /// originated by `child_id`; flip `Both` to `Down`) before attaching
    /// it to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::AlreadySubscribed`] if this pair is
    /// already subscribed, or [`SubscriptionError::ParentUnreachable`] if
    /// the parent's stream never appears within the retry budget. Neither
    /// failure leaves a partial subscription behind.
    pub async fn subscribe(
        &self,
        parent_id: AgentId,
        child_id: AgentId,
        handler: Arc<dyn StreamHandler>,
        type_filter: Option<TypeFilter>,
        retry: &RetryPolicy,
    ) -> SubscriptionResult<SubscriptionHandle> {
        let key = (parent_id, child_id);
        {
            let guard = self.live.lock().expect("subscription registry poisoned");
            if guard.contains_key(&key) {
                return Err(SubscriptionError::AlreadySubscribed {
                    parent: parent_id,
                    child: child_id,
                });
            }
        }

        if parent_id == child_id {
            return Err(SubscriptionError::CycleDetected {
                parent: parent_id,
                child: child_id,
                via: child_id,
            });
        }
        if let Some(via) = self.find_ancestor(parent_id, child_id) {
            return Err(SubscriptionError::CycleDetected {
                parent: parent_id,
                child: child_id,
                via,
            });
        }

        let stream = self.locate_parent_stream(parent_id, retry).await?;

        let wrapped: Arc<dyn StreamHandler> =
            Arc::new(LoopSafeHandler::new(child_id, Arc::clone(&handler)));
        let subscription = stream.subscribe(wrapped, type_filter.clone());

        let mut guard = self.live.lock().expect("subscription registry poisoned");
        guard.insert(
            key,
            LiveSubscription {
                subscription,
                stream,
                handler,
                filter: type_filter,
            },
        );
        drop(guard);
        self.parent_of
            .lock()
            .expect("subscription registry poisoned")
            .insert(child_id, parent_id);

        Ok(SubscriptionHandle { parent_id, child_id })
    }

    /// Subscribes `ancestor_id` to `descendant_id`'s stream so it observes
    /// the `Up`/`Both` envelopes the descendant publishes, per §4.6's
    /// "parents observing us see Up/Both". Keyed as `(descendant_id,
    /// ancestor_id)` in the same registry `subscribe` uses for the
    /// downward leg, so a linked pair carries two independent live
    /// subscriptions — one per direction of observation.
    ///
    /// Skips the ancestor-chain cycle check `subscribe` performs: this is
    /// a second technical subscription over a hierarchy edge
    /// [`crate::SubscriptionManager::subscribe`] (or the runtime's
    /// `add_child`/`set_parent`) has already validated, not a new edge.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::AlreadySubscribed`] if this pair is
    /// already subscribed, or [`SubscriptionError::ParentUnreachable`] if
    /// the descendant's stream never appears within the retry budget.
    pub async fn subscribe_ancestor(
        &self,
        descendant_id: AgentId,
        ancestor_id: AgentId,
        handler: Arc<dyn StreamHandler>,
        retry: &RetryPolicy,
    ) -> SubscriptionResult<SubscriptionHandle> {
        let key = (descendant_id, ancestor_id);
        {
            let guard = self.live.lock().expect("subscription registry poisoned");
            if guard.contains_key(&key) {
                return Err(SubscriptionError::AlreadySubscribed {
                    parent: descendant_id,
                    child: ancestor_id,
                });
            }
        }

        let stream = self.locate_parent_stream(descendant_id, retry).await?;
        let wrapped: Arc<dyn StreamHandler> = Arc::new(AncestorObserverHandler::new(handler.clone()));
        let subscription = stream.subscribe(wrapped, None);

        let mut guard = self.live.lock().expect("subscription registry poisoned");
        guard.insert(
            key,
            LiveSubscription {
                subscription,
                stream,
                handler,
                filter: None,
            },
        );

        Ok(SubscriptionHandle {
            parent_id: descendant_id,
            child_id: ancestor_id,
        })
    }

    async fn locate_parent_stream(
        &self,
        parent_id: AgentId,
        retry: &RetryPolicy,
    ) -> SubscriptionResult<Arc<MessageStream>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(stream) = self.streams.get(parent_id) {
                return Ok(stream);
            }
            if !retry.should_retry(attempt) {
                return Err(SubscriptionError::ParentUnreachable {
                    parent: parent_id,
                    attempts: attempt,
                });
            }
            tokio::time::sleep(retry.delay(attempt)).await;
        }
    }

    /// Returns whether `handle` still points at a live, active
    /// subscription against the parent's current stream.
    #[must_use]
    pub fn is_healthy(&self, handle: SubscriptionHandle) -> bool {
        let guard = self.live.lock().expect("subscription registry poisoned");
        let Some(entry) = guard.get(&(handle.parent_id, handle.child_id)) else {
            return false;
        };
        let Some(current) = self.streams.get(handle.parent_id) else {
            return false;
        };
        Arc::ptr_eq(&current, &entry.stream) && entry.subscription.is_active()
    }

    /// Attempts to restore `handle` to health.
    ///
    /// Tries [`Subscription::resume`] first; if the parent's stream has
    /// since been replaced (e.g. the parent reactivated), tears down the
    /// stale subscription and recreates it against the current stream,
    /// preserving the originally registered handler and filter.
    /// Idempotent: calling this on an already-healthy handle is a no-op
    /// beyond the resume call.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] if `handle` is not
    /// registered, or [`SubscriptionError::ParentUnreachable`] if the
    /// parent currently has no stream at all.
    pub fn reconnect(&self, handle: SubscriptionHandle) -> SubscriptionResult<()> {
        let key = (handle.parent_id, handle.child_id);
        let mut guard = self.live.lock().expect("subscription registry poisoned");
        let entry = guard.get_mut(&key).ok_or(SubscriptionError::NotFound {
            parent: handle.parent_id,
            child: handle.child_id,
        })?;

        let current_stream = self.streams.get(handle.parent_id);
        let same_stream = current_stream
            .as_ref()
            .is_some_and(|stream| Arc::ptr_eq(stream, &entry.stream));

        if same_stream {
            entry.subscription.resume();
            if entry.subscription.is_active() {
                return Ok(());
            }
        }

        let Some(stream) = current_stream else {
            return Err(SubscriptionError::ParentUnreachable {
                parent: handle.parent_id,
                attempts: 0,
            });
        };

        let wrapped: Arc<dyn StreamHandler> =
            Arc::new(LoopSafeHandler::new(handle.child_id, Arc::clone(&entry.handler)));
        let new_subscription = stream.subscribe(wrapped, entry.filter.clone());
        let stale = std::mem::replace(&mut entry.subscription, new_subscription);
        stale.unsubscribe();
        entry.stream = stream;

        Ok(())
    }

    /// Disposes and removes `handle` from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] if `handle` is not
    /// registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> SubscriptionResult<()> {
        let mut guard = self.live.lock().expect("subscription registry poisoned");
        let entry = guard
            .remove(&(handle.parent_id, handle.child_id))
            .ok_or(SubscriptionError::NotFound {
                parent: handle.parent_id,
                child: handle.child_id,
            })?;
        entry.subscription.unsubscribe();
        // Only clear the hierarchy edge if this handle is the one that
        // created it — `subscribe_ancestor` mints handles keyed the same
        // shape but they never own an edge in `parent_of`.
        let mut parent_of = self.parent_of.lock().expect("subscription registry poisoned");
        if parent_of.get(&handle.child_id) == Some(&handle.parent_id) {
            parent_of.remove(&handle.child_id);
        }
        Ok(())
    }

    /// Returns a snapshot of every currently registered handle.
    #[must_use]
    pub fn active(&self) -> Vec<SubscriptionHandle> {
        self.live
            .lock()
            .expect("subscription registry poisoned")
            .keys()
            .map(|&(parent_id, child_id)| SubscriptionHandle { parent_id, child_id })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gagent_policy::BackpressurePolicy;
    use gagent_primitives::{Direction, EventEnvelope};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl StreamHandler for CountingHandler {
        async fn handle(&self, _envelope: EventEnvelope) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry() -> Arc<StreamRegistry> {
        Arc::new(StreamRegistry::new(16, BackpressurePolicy::default()))
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(5), 2.0, Duration::from_millis(20)).unwrap()
    }

    #[tokio::test]
    async fn subscribe_fails_without_leaving_a_partial_entry_when_parent_never_appears() {
        let manager = SubscriptionManager::new(registry());
        let parent = AgentId::random();
        let child = AgentId::random();
        let handler = Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0))));

        let err = manager
            .subscribe(parent, child, handler, None, &fast_retry())
            .await
            .expect_err("parent stream never created");

        assert!(matches!(err, SubscriptionError::ParentUnreachable { .. }));
        assert!(manager.active().is_empty());
    }

    #[tokio::test]
    async fn subscribe_retries_until_parent_stream_appears() {
        let streams = registry();
        let manager = SubscriptionManager::new(Arc::clone(&streams));
        let parent = AgentId::random();
        let child = AgentId::random();
        let handler = Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0))));

        let streams_clone = Arc::clone(&streams);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            streams_clone.get_or_create(parent);
        });

        let handle = manager
            .subscribe(parent, child, handler, None, &fast_retry())
            .await
            .expect("parent stream appears within retry budget");

        assert!(manager.is_healthy(handle));
    }

    #[tokio::test]
    async fn duplicate_subscribe_is_rejected() {
        let streams = registry();
        let parent = AgentId::random();
        let child = AgentId::random();
        streams.get_or_create(parent);

        let manager = SubscriptionManager::new(Arc::clone(&streams));
        let handler_a = Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0))));
        let handler_b = Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0))));

        manager
            .subscribe(parent, child, handler_a, None, &fast_retry())
            .await
            .unwrap();

        let err = manager
            .subscribe(parent, child, handler_b, None, &fast_retry())
            .await
            .expect_err("second subscribe for the same pair should fail");
        assert!(matches!(err, SubscriptionError::AlreadySubscribed { .. }));
    }

    #[tokio::test]
    async fn loop_safety_filter_drops_child_originated_envelopes() {
        let streams = registry();
        let parent = AgentId::random();
        let child = AgentId::random();
        let stream = streams.get_or_create(parent);

        let manager = SubscriptionManager::new(Arc::clone(&streams));
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler(Arc::clone(&seen)));

        manager
            .subscribe(parent, child, handler, None, &fast_retry())
            .await
            .unwrap();

        let own_envelope = EventEnvelope::new(child, "ping", json!(null), Direction::Down).unwrap();
        stream.produce(own_envelope).await;
        let other_envelope = EventEnvelope::new(parent, "ping", json!(null), Direction::Down).unwrap();
        stream.produce(other_envelope).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reconnect_recreates_subscription_after_parent_stream_replaced() {
        let streams = registry();
        let parent = AgentId::random();
        let child = AgentId::random();
        streams.get_or_create(parent);

        let manager = SubscriptionManager::new(Arc::clone(&streams));
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler(Arc::clone(&seen)));

        let handle = manager
            .subscribe(parent, child, handler, None, &fast_retry())
            .await
            .unwrap();

        streams.remove(parent);
        let new_stream = streams.get_or_create(parent);
        assert!(!manager.is_healthy(handle));

        manager.reconnect(handle).unwrap();
        assert!(manager.is_healthy(handle));

        let envelope = EventEnvelope::new(parent, "ping", json!(null), Direction::Down).unwrap();
        new_stream.produce(envelope).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_rejects_a_cycle_across_three_generations() {
        let streams = registry();
        let grandparent = AgentId::random();
        let parent = AgentId::random();
        let grandchild = AgentId::random();
        streams.get_or_create(grandparent);
        streams.get_or_create(parent);
        streams.get_or_create(grandchild);

        let manager = SubscriptionManager::new(Arc::clone(&streams));
        let handler = || Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0))));

        manager
            .subscribe(grandparent, parent, handler(), None, &fast_retry())
            .await
            .unwrap();
        manager
            .subscribe(parent, grandchild, handler(), None, &fast_retry())
            .await
            .unwrap();

        let err = manager
            .subscribe(grandchild, grandparent, handler(), None, &fast_retry())
            .await
            .expect_err("closing the loop back to the root should be rejected");
        assert!(matches!(err, SubscriptionError::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_active_set() {
        let streams = registry();
        let parent = AgentId::random();
        let child = AgentId::random();
        streams.get_or_create(parent);

        let manager = SubscriptionManager::new(Arc::clone(&streams));
        let handler = Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0))));
        let handle = manager
            .subscribe(parent, child, handler, None, &fast_retry())
            .await
            .unwrap();

        assert_eq!(manager.active().len(), 1);
        manager.unsubscribe(handle).unwrap();
        assert!(manager.active().is_empty());
        assert!(manager.unsubscribe(handle).is_err());
    }
}
