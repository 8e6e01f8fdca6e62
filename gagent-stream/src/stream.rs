//! Per-agent bounded, multi-consumer, type-filtered event stream.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gagent_policy::BackpressurePolicy;
use gagent_primitives::EventEnvelope;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receives envelopes handed off by a [`MessageStream`] subscription, in
/// order.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Handles one envelope.
    async fn handle(&self, envelope: EventEnvelope);
}

#[async_trait]
impl<F, Fut> StreamHandler for F
where
    F: Send + Sync + Fn(EventEnvelope) -> Fut,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, envelope: EventEnvelope) {
        (self)(envelope).await;
    }
}

/// Predicate applied to an envelope's type tag before handoff to a
/// subscriber.
pub type TypeFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Builds a [`TypeFilter`] that accepts only the listed event type tags.
#[must_use]
pub fn accept_only(types: impl IntoIterator<Item = impl Into<String>>) -> TypeFilter {
    let allowed: Vec<String> = types.into_iter().map(Into::into).collect();
    Arc::new(move |event_type: &str| allowed.iter().any(|t| t == event_type))
}

/// Opaque identifier for a live subscription.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

struct SubscriberEntry {
    sender: mpsc::Sender<EventEnvelope>,
    filter: Option<TypeFilter>,
    active: Arc<AtomicBool>,
}

struct StreamInner {
    subscribers: Mutex<HashMap<u64, SubscriberEntry>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

/// A per-agent bounded FIFO of envelopes: single-writer (the owning
/// actor), multi-reader (subscribers, typically children or parent
/// subscriptions). Producer order is preserved per subscriber; no
/// ordering is promised across distinct streams.
pub struct MessageStream {
    capacity: usize,
    backpressure: BackpressurePolicy,
    inner: Arc<StreamInner>,
}

impl MessageStream {
    /// Creates a stream with the given per-subscriber channel capacity
    /// and backpressure policy.
    #[must_use]
    pub fn new(capacity: usize, backpressure: BackpressurePolicy) -> Self {
        Self {
            capacity,
            backpressure,
            inner: Arc::new(StreamInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Produces `envelope` to every active, matching subscriber.
    ///
    /// For each subscriber whose queue is full, blocks until space frees
    /// up or the backpressure deadline elapses, then drops the envelope
    /// for that subscriber and increments the drop counter.
    pub async fn produce(&self, envelope: EventEnvelope) {
        let entries: Vec<(u64, mpsc::Sender<EventEnvelope>)> = {
            let guard = self.inner.subscribers.lock().expect("stream poisoned");
            guard
                .iter()
                .filter(|(_, entry)| entry.active.load(Ordering::SeqCst))
                .filter(|(_, entry)| {
                    entry
                        .filter
                        .as_ref()
                        .is_none_or(|f| f(envelope.event_type()))
                })
                .map(|(id, entry)| (*id, entry.sender.clone()))
                .collect()
        };

        for (id, sender) in entries {
            match sender.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(envelope)) => {
                    let deadline = self.backpressure.deadline();
                    match tokio::time::timeout(deadline, sender.send(envelope)).await {
                        Ok(Ok(())) => {}
                        _ => {
                            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
                            warn!(subscriber = id, "stream backpressure deadline exceeded, dropping envelope");
                        }
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = id, "stream subscriber channel closed");
                }
            }
        }
    }

    /// Subscribes `handler` to this stream, optionally narrowed by
    /// `filter`. Returns a handle usable to unsubscribe, pause/resume, or
    /// dispose.
    pub fn subscribe(
        &self,
        handler: Arc<dyn StreamHandler>,
        filter: Option<TypeFilter>,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, mut receiver) = mpsc::channel(self.capacity.max(1));
        let active = Arc::new(AtomicBool::new(true));

        self.inner.subscribers.lock().expect("stream poisoned").insert(
            id,
            SubscriberEntry {
                sender,
                filter,
                active: Arc::clone(&active),
            },
        );

        let task = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                handler.handle(envelope).await;
            }
        });

        Subscription {
            id: SubscriptionId(id),
            active,
            task: Some(task),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the number of envelopes dropped due to backpressure
    /// deadlines across all subscribers.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Returns the number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().expect("stream poisoned").len()
    }
}

/// A live attachment between a subscriber and a [`MessageStream`].
pub struct Subscription {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    inner: Arc<StreamInner>,
}

impl Subscription {
    /// Returns this subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns whether the subscription is currently active (receiving
    /// deliveries).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Pauses delivery without tearing down the underlying channel —
    /// envelopes produced while paused are simply not matched by
    /// `produce`'s active-subscriber filter and are not queued.
    pub fn pause(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Resumes delivery after a pause.
    pub fn resume(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Removes this subscription from the stream's subscriber set and
    /// stops its delivery task.
    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    /// Alias for [`Subscription::unsubscribe`], named for parity with the
    /// runtime specification's lifecycle vocabulary.
    pub fn dispose(self) {
        self.unsubscribe();
    }

    fn teardown(&mut self) {
        self.inner
            .subscribers
            .lock()
            .expect("stream poisoned")
            .remove(&self.id.0);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gagent_primitives::{AgentId, Direction};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope::new(AgentId::random(), event_type, serde_json::json!(null), Direction::Down).unwrap()
    }

    #[tokio::test]
    async fn subscriber_observes_envelopes_in_produce_order() {
        let stream = MessageStream::new(8, BackpressurePolicy::default());
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);

        let handler: Arc<dyn StreamHandler> = Arc::new(move |envelope: EventEnvelope| {
            let received = Arc::clone(&received_clone);
            async move {
                received.lock().unwrap().push(envelope.event_type().to_owned());
            }
        });

        let _sub = stream.subscribe(handler, None);
        stream.produce(envelope("a")).await;
        stream.produce(envelope("b")).await;
        stream.produce(envelope("c")).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*received.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn type_filter_excludes_non_matching_events() {
        let stream = MessageStream::new(8, BackpressurePolicy::default());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let handler: Arc<dyn StreamHandler> = Arc::new(move |_: EventEnvelope| {
            let count = Arc::clone(&count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let _sub = stream.subscribe(handler, Some(accept_only(["ping"])));
        stream.produce(envelope("ping")).await;
        stream.produce(envelope("pong")).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_under_short_deadline() {
        let stream = MessageStream::new(1, BackpressurePolicy::new(Duration::from_millis(5)));
        let handler: Arc<dyn StreamHandler> = Arc::new(|_: EventEnvelope| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let _sub = stream.subscribe(handler, None);
        for _ in 0..5 {
            stream.produce(envelope("tick")).await;
        }

        assert!(stream.dropped_count() > 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_registry() {
        let stream = MessageStream::new(4, BackpressurePolicy::default());
        let handler: Arc<dyn StreamHandler> = Arc::new(|_: EventEnvelope| async {});
        let sub = stream.subscribe(handler, None);
        assert_eq!(stream.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(stream.subscriber_count(), 0);
    }
}
