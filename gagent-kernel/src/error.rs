//! Error types for the agent kernel.

use gagent_primitives::Error as PrimitivesError;
use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Errors surfaced by [`crate::GAgentKernel`] operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Lifecycle transition failure.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Envelope construction failure.
    #[error(transparent)]
    Envelope(#[from] PrimitivesError),

    /// Operation requires the agent to be activated.
    #[error("agent {0} is not activated")]
    NotActive(String),

    /// Adding `child` as a child of `parent` would introduce a cycle in the
    /// hierarchy graph.
    #[error("setting {child} as a child of {parent} would introduce a cycle")]
    CycleDetected {
        /// The agent that would become a parent.
        parent: String,
        /// The agent that would become a child.
        child: String,
    },
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
