//! Non-generic façade over a running actor, so the runtime can hold
//! agents of different concrete state/config types in one registry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gagent_kernel::{ActorHandle, AgentState, ChildForwarder, DispatchOutcome};
use gagent_primitives::{AgentId, Direction, EventEnvelope};
use gagent_store::VersionedStateStore;
use gagent_telemetry::set_actors_active;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{RuntimeError, RuntimeResult};
use crate::hierarchy::LiveAgents;

/// Object-safe operations available on any running agent, regardless of
/// its concrete state/config types.
#[async_trait]
pub trait DynAgent: Send + Sync {
    /// Returns this agent's identifier.
    fn agent_id(&self) -> AgentId;

    /// Publishes an event, as [`gagent_kernel::GAgentKernel::publish`].
    async fn publish(
        &self,
        event_type: String,
        payload: Value,
        direction: Direction,
    ) -> RuntimeResult<EventEnvelope>;

    /// Publishes a configuration update on the dedicated configuration
    /// event path, as [`gagent_kernel::GAgentKernel::publish_config`].
    async fn publish_config(&self, payload: Value, direction: Direction) -> RuntimeResult<EventEnvelope>;

    /// Dispatches an inbound envelope.
    async fn handle_event_async(&self, envelope: EventEnvelope) -> RuntimeResult<DispatchOutcome>;

    /// Returns the current lifecycle state.
    async fn lifecycle_state(&self) -> RuntimeResult<AgentState>;

    /// Deactivates the agent and persists its final state with optimistic
    /// concurrency against the version loaded (or last saved) for this
    /// agent.
    async fn deactivate(&self) -> RuntimeResult<()>;

    /// Records `parent` as this agent's parent.
    async fn set_parent(&self, parent: AgentId) -> RuntimeResult<()>;

    /// Adds `child` to this agent's children, enabling direct forwarding
    /// to it on a `Down`/`Both` publish.
    async fn add_child(&self, child: AgentId) -> RuntimeResult<()>;

    /// Removes `child` from this agent's children.
    async fn remove_child(&self, child: AgentId) -> RuntimeResult<()>;

    /// Installs the collaborator used to deliver envelopes directly to
    /// children on a `Down`/`Both` publish.
    async fn set_forwarder(&self, forwarder: Arc<dyn ChildForwarder>) -> RuntimeResult<()>;
}

impl std::fmt::Debug for dyn DynAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynAgent").field("agent_id", &self.agent_id()).finish()
    }
}

/// Wraps a typed [`ActorHandle`] with the state store needed to persist
/// on deactivation, erasing `S`/`C` behind [`DynAgent`].
pub(crate) struct ManagedAgent<S, C> {
    agent_id: AgentId,
    actor: ActorHandle<S, C>,
    store: Arc<dyn VersionedStateStore<S>>,
    version: AtomicU64,
    active_count: Arc<AtomicUsize>,
    allocated: Arc<Mutex<HashSet<AgentId>>>,
    live: LiveAgents,
}

impl<S, C> ManagedAgent<S, C>
where
    S: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub(crate) fn new(
        agent_id: AgentId,
        actor: ActorHandle<S, C>,
        store: Arc<dyn VersionedStateStore<S>>,
        initial_version: u64,
        active_count: Arc<AtomicUsize>,
        allocated: Arc<Mutex<HashSet<AgentId>>>,
        live: LiveAgents,
    ) -> Self {
        Self {
            agent_id,
            actor,
            store,
            version: AtomicU64::new(initial_version),
            active_count,
            allocated,
            live,
        }
    }
}

#[async_trait]
impl<S, C> DynAgent for ManagedAgent<S, C>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    async fn publish(
        &self,
        event_type: String,
        payload: Value,
        direction: Direction,
    ) -> RuntimeResult<EventEnvelope> {
        Ok(self.actor.publish(event_type, payload, direction).await?)
    }

    async fn publish_config(&self, payload: Value, direction: Direction) -> RuntimeResult<EventEnvelope> {
        Ok(self.actor.publish_config(payload, direction).await?)
    }

    async fn handle_event_async(&self, envelope: EventEnvelope) -> RuntimeResult<DispatchOutcome> {
        Ok(self.actor.handle_event_async(envelope).await?)
    }

    async fn lifecycle_state(&self) -> RuntimeResult<AgentState> {
        Ok(self.actor.lifecycle_state().await?)
    }

    async fn deactivate(&self) -> RuntimeResult<()> {
        let final_state = self.actor.deactivate().await?;
        if let Some(state) = final_state {
            let expected = self.version.load(Ordering::SeqCst);
            let saved = self.store.save_with_version(self.agent_id, &state, expected).await?;
            self.version.store(saved, Ordering::SeqCst);
        }
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        set_actors_active(remaining);

        // Releases this id back to the runtime so `create_actor` can
        // reactivate it under the same id — the Deactivated -> re-Activated
        // leg S1/S2 depend on. A still-live agent never reaches here, so
        // there is no race with a second, concurrently-active agent of the
        // same id.
        self.allocated.lock().expect("runtime agent registry poisoned").remove(&self.agent_id);
        self.live.lock().expect("runtime agent registry poisoned").remove(&self.agent_id);

        Ok(())
    }

    async fn set_parent(&self, parent: AgentId) -> RuntimeResult<()> {
        Ok(self.actor.set_parent(parent).await?)
    }

    async fn add_child(&self, child: AgentId) -> RuntimeResult<()> {
        Ok(self.actor.add_child(child).await?)
    }

    async fn remove_child(&self, child: AgentId) -> RuntimeResult<()> {
        Ok(self.actor.remove_child(child).await?)
    }

    async fn set_forwarder(&self, forwarder: Arc<dyn ChildForwarder>) -> RuntimeResult<()> {
        Ok(self.actor.set_forwarder(forwarder).await?)
    }
}
