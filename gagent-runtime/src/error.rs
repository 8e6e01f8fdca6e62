//! Errors raised by the runtime's factory and composition root.

use gagent_kernel::{ActorError, KernelError};
use gagent_primitives::AgentId;
use gagent_store::StoreError;
use gagent_subscription::SubscriptionError;
use thiserror::Error;

/// Errors surfaced while creating or operating an actor through
/// [`crate::Runtime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An agent with this id is already registered.
    #[error("agent {0} is already registered")]
    DuplicateAgent(AgentId),
    /// No agent with this id is currently registered in this runtime.
    #[error("no agent registered with id {0}")]
    UnknownAgent(AgentId),
    /// The kernel rejected the operation.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// The actor's mailbox rejected the operation.
    #[error(transparent)]
    Actor(#[from] ActorError),
    /// A state or config store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Subscribing a child to a parent's stream failed.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
