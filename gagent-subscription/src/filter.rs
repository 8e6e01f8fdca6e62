//! Loop-safety wrapper applied to every child-side subscription handler.

use std::sync::Arc;

use async_trait::async_trait;
use gagent_primitives::{AgentId, Direction, EventEnvelope};
use gagent_stream::StreamHandler;

/// Wraps a user handler with the two loop-safety rules a child's
/// subscription to its parent's stream must apply before delivery:
/// envelopes the child itself originated are dropped, and `Both`
/// envelopes are flipped to `Down` so the child never re-climbs them.
pub(crate) struct LoopSafeHandler {
    child_id: AgentId,
    inner: Arc<dyn StreamHandler>,
}

impl LoopSafeHandler {
    pub(crate) fn new(child_id: AgentId, inner: Arc<dyn StreamHandler>) -> Self {
        Self { child_id, inner }
    }
}

#[async_trait]
impl StreamHandler for LoopSafeHandler {
    async fn handle(&self, envelope: EventEnvelope) {
        if envelope.originator() == Some(self.child_id) {
            return;
        }

        let envelope = match envelope.direction() {
            Direction::Both => envelope.with_direction(Direction::Down),
            _ => envelope,
        };

        self.inner.handle(envelope).await;
    }
}

/// Wraps a user handler with the loop-safety rule an ancestor's
/// subscription to a descendant's stream must apply: only `Up`/`Both`
/// envelopes are ancestor-bound, so `Down`-only ones are dropped, and
/// `Both` is flipped to `Up` so the ancestor never re-climbs it further.
pub(crate) struct AncestorObserverHandler {
    inner: Arc<dyn StreamHandler>,
}

impl AncestorObserverHandler {
    pub(crate) fn new(inner: Arc<dyn StreamHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StreamHandler for AncestorObserverHandler {
    async fn handle(&self, envelope: EventEnvelope) {
        let envelope = match envelope.direction() {
            Direction::Up => envelope,
            Direction::Both => envelope.with_direction(Direction::Up),
            Direction::Down => return,
        };
        self.inner.handle(envelope).await;
    }
}
