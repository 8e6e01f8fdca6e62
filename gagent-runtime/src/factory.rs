//! Composition root: builds and wires the shared collaborators (stream
//! registry, subscription manager, per-agent dedup) and exposes
//! `create_actor` as the single entry point for bringing an agent to
//! life.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gagent_dedup::{DedupConfig, Deduplicator};
use gagent_kernel::{ActorHandle, ChildForwarder, GAgentKernel, HandlerTable, DEFAULT_MAILBOX_CAPACITY};
use gagent_policy::{BackpressurePolicy, RetryPolicy};
use gagent_primitives::AgentId;
use gagent_store::VersionedStateStore;
use gagent_stream::{StreamHandler, StreamRegistry};
use gagent_subscription::SubscriptionManager;
use gagent_telemetry::set_actors_active;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::dyn_agent::{DynAgent, ManagedAgent};
use crate::error::{RuntimeError, RuntimeResult};
use crate::handlers_trait::GAgentHandlers;
use crate::hierarchy::{LiveAgents, RuntimeForwarder};
use crate::llm::LlmProviderFactory;

/// Default per-agent stream capacity used when [`Runtime::new`] is not
/// given an explicit one via [`Runtime::with_stream_capacity`].
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Process-wide composition root. One `Runtime` owns the stream registry
/// and subscription manager shared by every actor it creates, and is the
/// only thing that allocates [`AgentId`]s and checks for collisions.
pub struct Runtime {
    streams: Arc<StreamRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    dedup_config: DedupConfig,
    mailbox_capacity: usize,
    allocated: Arc<Mutex<HashSet<AgentId>>>,
    live: LiveAgents,
    forwarder: Arc<RuntimeForwarder>,
    active_count: Arc<AtomicUsize>,
    default_retry: RetryPolicy,
}

impl Runtime {
    /// Builds a runtime with explicit stream, backpressure, and dedup
    /// configuration.
    #[must_use]
    pub fn new(stream_capacity: usize, backpressure: BackpressurePolicy, dedup_config: DedupConfig) -> Self {
        let streams = Arc::new(StreamRegistry::new(stream_capacity, backpressure));
        let subscriptions = Arc::new(SubscriptionManager::new(Arc::clone(&streams)));
        let live: LiveAgents = Arc::new(Mutex::new(HashMap::new()));
        let forwarder = Arc::new(RuntimeForwarder::new(Arc::clone(&live)));
        Self {
            streams,
            subscriptions,
            dedup_config,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            allocated: Arc::new(Mutex::new(HashSet::new())),
            live,
            forwarder,
            active_count: Arc::new(AtomicUsize::new(0)),
            default_retry: RetryPolicy::default_policy(),
        }
    }

    /// Overrides the mailbox capacity used for every actor this runtime
    /// spawns from this point on.
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Returns the shared stream registry, for wiring a [`SubscriptionManager`]
    /// health check or inspecting stream state in tests.
    #[must_use]
    pub fn streams(&self) -> Arc<StreamRegistry> {
        Arc::clone(&self.streams)
    }

    /// Returns the shared subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> Arc<SubscriptionManager> {
        Arc::clone(&self.subscriptions)
    }

    /// Allocates `id` if none was supplied, instantiates the agent type
    /// `H`, injects its state/config/LLM collaborators, wraps it in an
    /// actor, activates it, and returns the erased handle.
    ///
    /// `id` only collides with an agent still live in this runtime —
    /// [`ManagedAgent::deactivate`](crate::dyn_agent) releases the id on
    /// deactivation, so reactivating the same id after it (the
    /// `Deactivated -> Activated` transition) goes through this same path
    /// rather than a dedicated reactivation method.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::DuplicateAgent`] if `id` is already
    /// registered to a live agent, or propagates a
    /// [`gagent_kernel::KernelError`], [`gagent_kernel::ActorError`], or
    /// [`gagent_store::StoreError`] encountered while loading state or
    /// activating.
    pub async fn create_actor<H>(
        &self,
        id: Option<AgentId>,
        state_store: Arc<dyn VersionedStateStore<H::State>>,
        initial_config: Option<H::Config>,
        llm: Option<Arc<dyn LlmProviderFactory>>,
    ) -> RuntimeResult<Arc<dyn DynAgent>>
    where
        H: GAgentHandlers,
        H::State: Clone + Serialize + DeserializeOwned,
    {
        let agent_id = id.unwrap_or_else(AgentId::random);
        {
            let mut guard = self.allocated.lock().expect("runtime agent registry poisoned");
            if !guard.insert(agent_id) {
                return Err(RuntimeError::DuplicateAgent(agent_id));
            }
        }

        let dedup = Arc::new(Deduplicator::new(self.dedup_config.clone()));
        let stream = self.streams.get_or_create(agent_id);
        let placeholder_table = Arc::new(HandlerTable::builder().build());

        let mut kernel: GAgentKernel<H::State, H::Config> =
            GAgentKernel::new(agent_id, H::agent_type(), placeholder_table, dedup, stream);

        let handler_table = H::build_handlers(kernel.state_handle(), kernel.config_handle(), llm);
        kernel.set_handler_table(Arc::new(handler_table));
        kernel.set_hooks(H::hooks());

        let loaded_state = state_store.load(agent_id).await?;
        let loaded_version = state_store.current_version(agent_id).await?;

        let actor = ActorHandle::spawn(kernel, self.mailbox_capacity);
        actor.activate(loaded_state, loaded_version, initial_config).await?;

        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        set_actors_active(active);

        let agent: Arc<dyn DynAgent> = Arc::new(ManagedAgent::new(
            agent_id,
            actor,
            state_store,
            loaded_version,
            Arc::clone(&self.active_count),
            Arc::clone(&self.allocated),
            Arc::clone(&self.live),
        ));

        agent
            .set_forwarder(Arc::clone(&self.forwarder) as Arc<dyn ChildForwarder>)
            .await?;

        self.live
            .lock()
            .expect("runtime agent registry poisoned")
            .insert(agent_id, Arc::clone(&agent));

        Ok(agent)
    }

    /// Looks up an agent already created through this runtime by id.
    #[must_use]
    pub fn get(&self, agent_id: AgentId) -> Option<Arc<dyn DynAgent>> {
        self.live.lock().expect("runtime agent registry poisoned").get(&agent_id).cloned()
    }

    /// Establishes `child` as a child of `parent`: wires the hierarchy on
    /// both kernels (direct-forward path) and subscribes `child` to
    /// `parent`'s stream with a loop-safe handler that redelivers into
    /// `child`'s own dispatch (subscription path), per §4.6/§4.8.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownAgent`] if either id was not
    /// created through this runtime, or propagates a
    /// [`gagent_kernel::KernelError`]/[`gagent_subscription::SubscriptionError`]
    /// from the hierarchy or subscription operations.
    pub async fn link_parent_child(&self, parent_id: AgentId, child_id: AgentId) -> RuntimeResult<()> {
        let (parent, child) = {
            let guard = self.live.lock().expect("runtime agent registry poisoned");
            let parent = guard.get(&parent_id).cloned().ok_or(RuntimeError::UnknownAgent(parent_id))?;
            let child = guard.get(&child_id).cloned().ok_or(RuntimeError::UnknownAgent(child_id))?;
            (parent, child)
        };

        let deliver_to_child = Arc::clone(&child);
        let handler: Arc<dyn StreamHandler> = Arc::new(move |envelope| {
            let child = Arc::clone(&deliver_to_child);
            async move {
                if let Err(err) = child.handle_event_async(envelope).await {
                    warn!(child = %child_id, error = %err, "subscription delivery to child failed");
                }
            }
        });

        let deliver_to_parent = Arc::clone(&parent);
        let ancestor_handler: Arc<dyn StreamHandler> = Arc::new(move |envelope| {
            let parent = Arc::clone(&deliver_to_parent);
            async move {
                if let Err(err) = parent.handle_event_async(envelope).await {
                    warn!(parent = %parent_id, error = %err, "subscription delivery to parent failed");
                }
            }
        });

        // Validate (duplicate/cycle) and subscribe before touching either
        // kernel's hierarchy, so a rejected link leaves both sides
        // untouched rather than half-wired.
        self.subscriptions
            .subscribe(parent_id, child_id, handler, None, &self.default_retry)
            .await?;
        // Gives the parent a live view of the child's Up/Both emissions,
        // mirroring the Down/Both leg above. Rides on the edge the
        // subscribe() call just validated, so no second cycle check.
        self.subscriptions
            .subscribe_ancestor(child_id, parent_id, ancestor_handler, &self.default_retry)
            .await?;

        parent.add_child(child_id).await?;
        child.set_parent(parent_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gagent_kernel::{EventHandler, HandlerOutcome};
    use gagent_primitives::{Direction, EventEnvelope};
    use gagent_store::InMemoryStateStore;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::RwLock;

    #[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        count: i64,
    }

    struct CounterAgent;

    struct IncrementHandler {
        state: Arc<RwLock<Option<Counter>>>,
    }

    #[async_trait]
    impl EventHandler for IncrementHandler {
        async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome {
            let amount: i64 = envelope
                .payload_as::<serde_json::Value>()
                .ok()
                .and_then(|v| v.get("amount").and_then(serde_json::Value::as_i64))
                .unwrap_or(0);
            let mut guard = self.state.write().await;
            let counter = guard.get_or_insert_with(Counter::default);
            counter.count += amount;
            Ok(())
        }
    }

    impl GAgentHandlers for CounterAgent {
        type State = Counter;
        type Config = ();

        fn type_name() -> &'static str {
            "counter"
        }

        fn build_handlers(
            state: Arc<RwLock<Option<Self::State>>>,
            _config: Arc<RwLock<Option<Self::Config>>>,
            _llm: Option<Arc<dyn LlmProviderFactory>>,
        ) -> HandlerTable {
            HandlerTable::builder()
                .on_event("Increment", 0, false, IncrementHandler { state })
                .build()
        }
    }

    #[tokio::test]
    async fn create_actor_activates_and_dispatches() {
        let runtime = Runtime::new(16, BackpressurePolicy::default(), DedupConfig::default());
        let store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());

        let agent = runtime
            .create_actor::<CounterAgent>(None, Arc::clone(&store), Some(()), None)
            .await
            .unwrap();

        let envelope = agent
            .publish("Increment".to_string(), json!({"amount": 3}), Direction::Down)
            .await
            .unwrap();
        let outcome = agent.handle_event_async(envelope).await.unwrap();
        assert_eq!(outcome.handlers_run, 1);

        agent.deactivate().await.unwrap();

        let persisted = store.load(agent.agent_id()).await.unwrap();
        assert_eq!(persisted, Some(Counter { count: 3 }));
    }

    #[tokio::test]
    async fn duplicate_agent_id_is_rejected() {
        let runtime = Runtime::new(16, BackpressurePolicy::default(), DedupConfig::default());
        let store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::random();

        runtime
            .create_actor::<CounterAgent>(Some(id), Arc::clone(&store), Some(()), None)
            .await
            .unwrap();

        let err = runtime
            .create_actor::<CounterAgent>(Some(id), store, Some(()), None)
            .await
            .expect_err("second create_actor with the same id should fail");
        assert!(matches!(err, RuntimeError::DuplicateAgent(dup) if dup == id));
    }

    #[tokio::test]
    async fn link_parent_child_forwards_down_events_to_child() {
        let runtime = Runtime::new(16, BackpressurePolicy::default(), DedupConfig::default());
        let parent_store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());
        let child_store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());

        let parent = runtime
            .create_actor::<CounterAgent>(None, parent_store, Some(()), None)
            .await
            .unwrap();
        let child = runtime
            .create_actor::<CounterAgent>(None, Arc::clone(&child_store), Some(()), None)
            .await
            .unwrap();

        runtime.link_parent_child(parent.agent_id(), child.agent_id()).await.unwrap();

        // The direct-forward leg of `publish` awaits delivery into the
        // child's dispatch before returning, so the handler has already
        // run once `publish` resolves.
        parent
            .publish("Increment".to_string(), json!({"amount": 5}), Direction::Down)
            .await
            .unwrap();

        child.deactivate().await.unwrap();
        let persisted = child_store.load(child.agent_id()).await.unwrap();
        assert_eq!(persisted, Some(Counter { count: 5 }));
    }

    #[tokio::test]
    async fn link_parent_child_lets_parent_observe_upward_events() {
        let runtime = Runtime::new(16, BackpressurePolicy::default(), DedupConfig::default());
        let parent_store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());
        let child_store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());

        let parent = runtime
            .create_actor::<CounterAgent>(None, Arc::clone(&parent_store), Some(()), None)
            .await
            .unwrap();
        let child = runtime
            .create_actor::<CounterAgent>(None, child_store, Some(()), None)
            .await
            .unwrap();

        runtime.link_parent_child(parent.agent_id(), child.agent_id()).await.unwrap();

        // Unlike the Down leg, ancestor observation rides a spawned
        // subscription task rather than `publish`'s direct-forward leg,
        // so delivery is only eventually visible.
        child
            .publish("Increment".to_string(), json!({"amount": 9}), Direction::Up)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        parent.deactivate().await.unwrap();
        let persisted = parent_store.load(parent.agent_id()).await.unwrap();
        assert_eq!(persisted, Some(Counter { count: 9 }));
    }
}
