//! Agent-author entry point: declares how one agent type's state,
//! config, and handler table come together.

use std::sync::Arc;

use gagent_kernel::{HandlerTable, LifecycleHooks, NoopHooks};
use gagent_primitives::AgentType;
use tokio::sync::RwLock;

use crate::llm::LlmProviderFactory;

/// Implemented once per agent type. [`crate::Runtime::create_actor`] calls
/// [`GAgentHandlers::build_handlers`] after constructing the kernel, so
/// handler closures can capture the kernel's own state/config cells
/// directly — no reflection over field names is involved.
pub trait GAgentHandlers: Send + Sync + 'static {
    /// The agent's persisted state type.
    type State: Send + Sync + 'static;
    /// The agent's persisted configuration type.
    type Config: Send + Sync + 'static;

    /// Returns the static type name this agent registers under.
    fn type_name() -> &'static str;

    /// Returns the agent type, derived from [`GAgentHandlers::type_name`].
    ///
    /// # Panics
    ///
    /// Panics if `type_name` returns an empty string, which indicates a
    /// broken implementation rather than bad runtime input.
    #[must_use]
    fn agent_type() -> AgentType {
        AgentType::new(Self::type_name()).expect("agent type name must be non-empty")
    }

    /// Builds the handler table for one instance of this agent type,
    /// given the shared state/config cells owned by its kernel and the
    /// optional LLM provider factory the caller injected.
    fn build_handlers(
        state: Arc<RwLock<Option<Self::State>>>,
        config: Arc<RwLock<Option<Self::Config>>>,
        llm: Option<Arc<dyn LlmProviderFactory>>,
    ) -> HandlerTable;

    /// Returns the lifecycle hooks for this agent type. Defaults to
    /// no-op hooks.
    fn hooks() -> Arc<dyn LifecycleHooks<Self::State, Self::Config>> {
        Arc::new(NoopHooks)
    }
}
