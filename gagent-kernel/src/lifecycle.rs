//! Lifecycle state machine for GAgent kernels.

use gagent_primitives::AgentId;
use thiserror::Error;
use tracing::debug;

/// States an agent kernel occupies over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Kernel constructed, not yet activated; no state loaded.
    Created,
    /// State has been loaded (snapshot or replay) and `on_activate` has run.
    Activated,
    /// Deactivated; state flushed and stream/subscriptions disposed. May be
    /// re-activated.
    Deactivated,
}

impl AgentState {
    /// Returns `true` when the agent is actively handling events.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// Events that trigger lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Load state and run `on_activate`.
    Activate,
    /// Flush state, dispose stream/subscriptions, and run `on_deactivate`.
    Deactivate,
}

/// Lifecycle state manager for one agent.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    agent_id: AgentId,
    state: AgentState,
}

impl Lifecycle {
    /// Constructs a lifecycle controller for the given agent, starting in
    /// `Created`.
    #[must_use]
    pub const fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            state: AgentState::Created,
        }
    }

    /// Returns the owning agent identifier.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Applies a lifecycle event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the supplied event
    /// is not allowed from the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<AgentState> {
        let next = match (self.state, event) {
            (AgentState::Created | AgentState::Deactivated, LifecycleEvent::Activate) => {
                Some(AgentState::Activated)
            }
            (AgentState::Activated, LifecycleEvent::Deactivate) => Some(AgentState::Deactivated),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                agent_id: self.agent_id,
                from: self.state,
                event,
            });
        };

        debug!(
            agent_id = %self.agent_id,
            ?self.state,
            ?next_state,
            ?event,
            "agent lifecycle transition"
        );
        self.state = next_state;

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid lifecycle transition from {from:?} via {event:?} for agent {agent_id}")]
    InvalidTransition {
        /// Identifier of the agent whose transition failed.
        agent_id: AgentId,
        /// State prior to the attempted transition.
        from: AgentState,
        /// Event that triggered the failure.
        event: LifecycleEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn new_id() -> AgentId {
        AgentId::random()
    }

    #[test]
    fn created_to_activated_flow() {
        let agent_id = new_id();
        let mut lifecycle = Lifecycle::new(agent_id);

        assert_eq!(lifecycle.state(), AgentState::Created);
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        assert!(lifecycle.state().is_active());
    }

    #[test]
    fn deactivate_then_reactivate() {
        let agent_id = new_id();
        let mut lifecycle = Lifecycle::new(agent_id);

        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        lifecycle.transition(LifecycleEvent::Deactivate).unwrap();
        assert_eq!(lifecycle.state(), AgentState::Deactivated);
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        assert!(lifecycle.state().is_active());
    }

    #[test]
    fn invalid_transition_errors() {
        let agent_id = new_id();
        let mut lifecycle = Lifecycle::new(agent_id);

        let err = lifecycle
            .transition(LifecycleEvent::Deactivate)
            .expect_err("deactivate should fail from created");

        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}
