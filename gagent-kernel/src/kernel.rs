//! The user-facing agent kernel: lifecycle, hierarchy, and event dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use gagent_dedup::Deduplicator;
use gagent_primitives::{AgentId, AgentType, Direction, EventEnvelope};
use gagent_stream::MessageStream;
use gagent_telemetry::{
    event_handling_span, observe_handle_duration_ms, observe_publish_duration_ms, record_dedup_duplicate,
    record_event_dropped, record_event_handled, record_event_published, record_exception,
};
use tokio::sync::RwLock;
use tracing::{warn, Instrument};

use crate::error::{KernelError, KernelResult};
use crate::handlers::{HandlerTable, CONFIG_EVENT_TYPE};
use crate::lifecycle::{AgentState, Lifecycle, LifecycleEvent};

/// Delivers an envelope directly to a child's kernel, bypassing the
/// child's stream subscription. Implemented by the runtime layer, which
/// alone knows how to resolve a sibling kernel's actor reference.
#[async_trait]
pub trait ChildForwarder: Send + Sync {
    /// Forwards `envelope` to `child`.
    async fn forward_to_child(&self, child: AgentId, envelope: EventEnvelope);
}

/// A [`ChildForwarder`] that drops every forward; used for kernels with
/// no hierarchy wiring (e.g. isolated unit tests).
#[derive(Default)]
pub struct NullForwarder;

#[async_trait]
impl ChildForwarder for NullForwarder {
    async fn forward_to_child(&self, _child: AgentId, _envelope: EventEnvelope) {}
}

/// User-overridable lifecycle hooks, run exactly once per activation and
/// deactivation under the actor's serialization.
#[async_trait]
pub trait LifecycleHooks<S: Send, C: Sync>: Send + Sync {
    /// Runs after state has been loaded (snapshot restore or event
    /// replay) and before the agent starts handling events.
    async fn on_activate(&self, state: &mut Option<S>, config: &Option<C>) {
        let _ = (state, config);
    }

    /// Runs after the lifecycle transitions to `Deactivated`, before the
    /// final state is handed back to the caller for persistence.
    async fn on_deactivate(&self, state: &Option<S>) {
        let _ = state;
    }
}

/// No-op hooks, used by agent types with no activation/deactivation work.
#[derive(Default)]
pub struct NoopHooks;

#[async_trait]
impl<S, C> LifecycleHooks<S, C> for NoopHooks
where
    S: Send + Sync,
    C: Send + Sync,
{
}

/// Outcome of running [`GAgentKernel::handle_event_async`].
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Number of handlers that ran to completion, successfully or not.
    pub handlers_run: usize,
    /// Reasons reported by handlers that failed. A handler failure never
    /// prevents the remaining handlers from running.
    pub failures: Vec<String>,
    /// True if the envelope was discarded before any handler ran (self-loop
    /// with no `allow_self` handler, or a duplicate already recorded).
    pub discarded: bool,
}

/// Generic agent kernel parameterized by its state type `S` and config
/// type `C`. Owns the lifecycle, hierarchy, and the machinery that routes
/// an incoming envelope to the handlers registered for its type.
///
/// State and config are exposed as shared, lock-guarded cells so that
/// handler closures captured in the agent type's [`HandlerTable`] can read
/// and mutate them directly — the kernel itself never reaches inside `S`
/// or `C`.
pub struct GAgentKernel<S, C> {
    agent_id: AgentId,
    agent_type: AgentType,
    lifecycle: Lifecycle,
    handler_table: Arc<HandlerTable>,
    dedup: Arc<Deduplicator>,
    stream: Arc<MessageStream>,
    forwarder: Arc<dyn ChildForwarder>,
    hooks: Arc<dyn LifecycleHooks<S, C>>,
    parent: Option<AgentId>,
    children: HashSet<AgentId>,
    state: Arc<RwLock<Option<S>>>,
    config: Arc<RwLock<Option<C>>>,
    state_version: u64,
}

impl<S, C> GAgentKernel<S, C>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Constructs a kernel in the `Created` state. `state`/`config` start
    /// empty and are populated by [`GAgentKernel::activate`].
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        agent_type: AgentType,
        handler_table: Arc<HandlerTable>,
        dedup: Arc<Deduplicator>,
        stream: Arc<MessageStream>,
    ) -> Self {
        Self {
            agent_id,
            agent_type,
            lifecycle: Lifecycle::new(agent_id),
            handler_table,
            dedup,
            stream,
            forwarder: Arc::new(NullForwarder),
            hooks: Arc::new(NoopHooks),
            parent: None,
            children: HashSet::new(),
            state: Arc::new(RwLock::new(None)),
            config: Arc::new(RwLock::new(None)),
            state_version: 0,
        }
    }

    /// Replaces the handler table, used once the agent type's handler
    /// closures have been built against this kernel's `state_handle`/
    /// `config_handle` (construction order requires the kernel to exist
    /// before those handles can be captured).
    pub fn set_handler_table(&mut self, handler_table: Arc<HandlerTable>) {
        self.handler_table = handler_table;
    }

    /// Installs the collaborator used to forward envelopes directly to
    /// children. Must be called before the first `Down`/`Both` publish
    /// with children attached.
    pub fn set_forwarder(&mut self, forwarder: Arc<dyn ChildForwarder>) {
        self.forwarder = forwarder;
    }

    /// Installs the lifecycle hooks run on activate/deactivate.
    pub fn set_hooks(&mut self, hooks: Arc<dyn LifecycleHooks<S, C>>) {
        self.hooks = hooks;
    }

    /// Returns a clone of the shared state cell, for handler closures to
    /// capture at [`HandlerTable`] construction time.
    #[must_use]
    pub fn state_handle(&self) -> Arc<RwLock<Option<S>>> {
        Arc::clone(&self.state)
    }

    /// Returns a clone of the shared config cell.
    #[must_use]
    pub fn config_handle(&self) -> Arc<RwLock<Option<C>>> {
        Arc::clone(&self.config)
    }

    /// Returns a cloned snapshot of the current state, for the caller to
    /// persist (e.g. after deactivation).
    pub async fn state_snapshot(&self) -> Option<S>
    where
        S: Clone,
    {
        self.state.read().await.clone()
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Returns the agent type.
    #[must_use]
    pub fn agent_type(&self) -> &AgentType {
        &self.agent_type
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn lifecycle_state(&self) -> AgentState {
        self.lifecycle.state()
    }

    /// Returns the version last persisted for this agent's state.
    #[must_use]
    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    /// Activates the kernel: seeds state/config (already loaded by the
    /// caller via snapshot restore or event replay) and transitions the
    /// lifecycle to `Activated`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Lifecycle`] if activation is not valid from
    /// the current state.
    pub async fn activate(
        &mut self,
        loaded_state: Option<S>,
        loaded_version: u64,
        loaded_config: Option<C>,
    ) -> KernelResult<()> {
        self.lifecycle.transition(LifecycleEvent::Activate)?;

        let mut state_guard = self.state.write().await;
        *state_guard = loaded_state;
        let config_guard = loaded_config;
        self.hooks.on_activate(&mut state_guard, &config_guard).await;
        drop(state_guard);

        *self.config.write().await = config_guard;
        self.state_version = loaded_version;
        Ok(())
    }

    /// Deactivates the kernel, transitioning the lifecycle to
    /// `Deactivated`. The caller is responsible for persisting state
    /// before or after this call and for disposing the stream and any
    /// subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Lifecycle`] if deactivation is not valid
    /// from the current state.
    pub async fn deactivate(&mut self) -> KernelResult<()> {
        self.lifecycle.transition(LifecycleEvent::Deactivate)?;
        let state_guard = self.state.read().await;
        self.hooks.on_deactivate(&state_guard).await;
        Ok(())
    }

    /// Returns the current parent, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<AgentId> {
        self.parent
    }

    /// Returns the current children.
    #[must_use]
    pub fn children(&self) -> &HashSet<AgentId> {
        &self.children
    }

    /// Sets the parent, replacing any previous one. Triggering the
    /// subscription manager to (re)subscribe is the caller's
    /// responsibility.
    pub fn set_parent(&mut self, parent: AgentId) {
        self.parent = Some(parent);
    }

    /// Clears the parent. Disposing the now-stale subscription is the
    /// caller's responsibility.
    pub fn clear_parent(&mut self) {
        self.parent = None;
    }

    /// Adds `child` to the children set.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::CycleDetected`] if `child` is this agent's
    /// own id (the only cycle this kernel can detect locally; longer
    /// cycles are refused by the subscription manager, which has
    /// visibility across the whole hierarchy).
    pub fn add_child(&mut self, child: AgentId) -> KernelResult<()> {
        if child == self.agent_id {
            return Err(KernelError::CycleDetected {
                parent: self.agent_id.to_string(),
                child: child.to_string(),
            });
        }
        self.children.insert(child);
        Ok(())
    }

    /// Removes `child` from the children set.
    pub fn remove_child(&mut self, child: AgentId) {
        self.children.remove(&child);
    }

    /// Builds and produces a fresh envelope to this agent's own stream
    /// and, when `direction` is `Down` or `Both`, forwards it directly to
    /// every child.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotActive`] if the agent is not activated,
    /// or [`KernelError::Envelope`] if `event_type` is empty.
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        direction: Direction,
    ) -> KernelResult<EventEnvelope> {
        if !self.lifecycle.state().is_active() {
            return Err(KernelError::NotActive(self.agent_id.to_string()));
        }

        let started = Instant::now();
        let envelope = EventEnvelope::new(self.agent_id, event_type, payload, direction)?;
        self.stream.produce(envelope.clone()).await;

        if matches!(direction, Direction::Down | Direction::Both) {
            let forwarded_direction = direction.on_downward_reflection();
            for child in &self.children {
                let forwarded = envelope.forwarded_by(self.agent_id, forwarded_direction);
                self.forwarder.forward_to_child(*child, forwarded).await;
            }
        }

        record_event_published(envelope.event_type(), self.agent_id);
        observe_publish_duration_ms(envelope.event_type(), self.agent_id, started.elapsed().as_secs_f64() * 1000.0);

        Ok(envelope)
    }

    /// The dedicated configuration event path: publishes `payload` under
    /// [`CONFIG_EVENT_TYPE`] instead of a user-chosen event type, so it
    /// only reaches handlers registered via
    /// [`crate::handlers::HandlerTableBuilder::on_config`]. Dispatch still
    /// goes through the normal `handle_event_async` call a caller makes
    /// with the returned envelope — this only covers the send side.
    ///
    /// # Errors
    ///
    /// As [`GAgentKernel::publish`].
    pub async fn publish_config(&self, payload: serde_json::Value, direction: Direction) -> KernelResult<EventEnvelope> {
        self.publish(CONFIG_EVENT_TYPE, payload, direction).await
    }

    /// Runs the §4.5 dispatch algorithm for an inbound envelope: self-loop
    /// filtering, deduplication, handler resolution, and sequential,
    /// error-isolated execution.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotActive`] if the agent is not activated.
    pub async fn handle_event_async(&self, envelope: &EventEnvelope) -> KernelResult<DispatchOutcome> {
        if !self.lifecycle.state().is_active() {
            return Err(KernelError::NotActive(self.agent_id.to_string()));
        }

        let mut handlers = self.handler_table.resolve(envelope.event_type());

        if envelope.already_traversed(self.agent_id) {
            handlers.retain(|entry| entry.allow_self());
            if handlers.is_empty() {
                record_event_dropped(envelope.event_type(), self.agent_id, "self_loop");
                return Ok(DispatchOutcome {
                    discarded: true,
                    ..Default::default()
                });
            }
        }

        match self.dedup.try_record(envelope.id()).await {
            Ok(false) => {
                record_dedup_duplicate(self.agent_id);
                record_event_dropped(envelope.event_type(), self.agent_id, "duplicate");
                return Ok(DispatchOutcome {
                    discarded: true,
                    ..Default::default()
                });
            }
            Err(err) => {
                warn!(agent_id = %self.agent_id, error = %err, "dedup rejected envelope id");
                record_exception("dedup");
                record_event_dropped(envelope.event_type(), self.agent_id, "dedup_error");
                return Ok(DispatchOutcome {
                    discarded: true,
                    ..Default::default()
                });
            }
            Ok(true) => {}
        }

        let span = event_handling_span(
            self.agent_id,
            envelope.id(),
            envelope.event_type(),
            envelope.correlation_id(),
        );

        let started = Instant::now();
        let outcome = async {
            let mut outcome = DispatchOutcome::default();
            for entry in handlers {
                match entry.invoke(envelope).await {
                    Ok(()) => {}
                    Err(failure) => {
                        warn!(agent_id = %self.agent_id, error = %failure, "handler failed");
                        record_exception("handler");
                        outcome.failures.push(failure.reason().to_owned());
                    }
                }
                outcome.handlers_run += 1;
            }
            outcome
        }
        .instrument(span)
        .await;

        record_event_handled(envelope.event_type(), self.agent_id);
        observe_handle_duration_ms(envelope.event_type(), self.agent_id, started.elapsed().as_secs_f64() * 1000.0);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerTable;
    use gagent_policy::BackpressurePolicy;
    use gagent_dedup::DedupConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn kernel_with_table(table: HandlerTable) -> GAgentKernel<i64, ()> {
        let mut kernel = GAgentKernel::new(
            AgentId::random(),
            AgentType::new("counter").unwrap(),
            Arc::new(table),
            Arc::new(Deduplicator::new(DedupConfig::default())),
            Arc::new(MessageStream::new(16, BackpressurePolicy::default())),
        );
        kernel.lifecycle.transition(LifecycleEvent::Activate).unwrap();
        kernel
    }

    #[tokio::test]
    async fn self_published_event_reaches_allow_self_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let table = HandlerTable::builder()
            .on_event("Increment", 0, true, move |_: &EventEnvelope| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        let kernel = kernel_with_table(table);
        let envelope = kernel.publish("Increment", json!({"amount": 5}), Direction::Down).await.unwrap();
        let outcome = kernel.handle_event_async(&envelope).await.unwrap();

        assert!(!outcome.discarded);
        assert_eq!(outcome.handlers_run, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn self_loop_without_allow_self_is_discarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let table = HandlerTable::builder()
            .on_event("Ping", 0, false, move |_: &EventEnvelope| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        let kernel = kernel_with_table(table);
        let envelope = kernel.publish("Ping", json!(null), Direction::Down).await.unwrap();
        let outcome = kernel.handle_event_async(&envelope).await.unwrap();

        assert!(outcome.discarded);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_discarded_by_dedup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let table = HandlerTable::builder()
            .on_event("Ping", 0, true, move |_: &EventEnvelope| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        let kernel = kernel_with_table(table);
        let envelope = kernel.publish("Ping", json!(null), Direction::Down).await.unwrap();

        let first = kernel.handle_event_async(&envelope).await.unwrap();
        let second = kernel.handle_event_async(&envelope).await.unwrap();

        assert!(!first.discarded);
        assert!(second.discarded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_failure_does_not_block_subsequent_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let table = HandlerTable::builder()
            .on_event("Ping", 0, true, |_: &EventEnvelope| async {
                Err(crate::handlers::HandlerFailure::new("boom"))
            })
            .on_event("Ping", 1, true, move |_: &EventEnvelope| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        let kernel = kernel_with_table(table);
        let envelope = kernel.publish("Ping", json!(null), Direction::Down).await.unwrap();
        let outcome = kernel.handle_event_async(&envelope).await.unwrap();

        assert_eq!(outcome.handlers_run, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adding_self_as_child_is_rejected() {
        let mut kernel = kernel_with_table(HandlerTable::builder().build());
        let own_id = kernel.agent_id();
        let err = kernel.add_child(own_id).expect_err("self-child should fail");
        assert!(matches!(err, KernelError::CycleDetected { .. }));
    }
}
