//! Errors raised by the subscription manager.

use gagent_primitives::AgentId;
use thiserror::Error;

/// Errors surfaced by [`crate::SubscriptionManager`] operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The parent's stream could not be located after exhausting the
    /// configured retry policy.
    #[error("parent {parent} has no stream after {attempts} attempt(s)")]
    ParentUnreachable {
        /// The parent agent that could not be found.
        parent: AgentId,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
    /// A subscription already exists for this parent/child pair.
    #[error("a subscription from {parent} to {child} already exists")]
    AlreadySubscribed {
        /// The parent side of the existing subscription.
        parent: AgentId,
        /// The child side of the existing subscription.
        child: AgentId,
    },
    /// The referenced handle has no corresponding live subscription.
    #[error("no active subscription for parent {parent} and child {child}")]
    NotFound {
        /// The parent side of the missing subscription.
        parent: AgentId,
        /// The child side of the missing subscription.
        child: AgentId,
    },
    /// Subscribing `child` to `parent` would close a cycle somewhere in
    /// the existing parent chain.
    #[error("subscribing {child} to {parent} would introduce a cycle via {via}")]
    CycleDetected {
        /// The parent side of the rejected subscription.
        parent: AgentId,
        /// The child side of the rejected subscription.
        child: AgentId,
        /// The ancestor at which the cycle would close.
        via: AgentId,
    },
}

/// Result alias for subscription manager operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;
