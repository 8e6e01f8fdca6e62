//! The agent kernel: lifecycle state machine, reflective handler
//! registry, hierarchy, event dispatch, and the serialized actor wrapper
//! built around them.

#![warn(missing_docs, clippy::pedantic)]

mod actor;
mod error;
mod handlers;
mod kernel;
mod lifecycle;
mod scheduler;

/// Serialized actor wrapper around one kernel instance.
pub use actor::{ActorError, ActorHandle, DEFAULT_MAILBOX_CAPACITY};
/// Kernel-level errors.
pub use error::{KernelError, KernelResult};
/// Reflective handler registry: table, builder, and handler trait.
pub use handlers::{
    EventHandler, HandlerEntry, HandlerFailure, HandlerOutcome, HandlerTable, HandlerTableBuilder,
    CONFIG_EVENT_TYPE,
};
/// The generic agent kernel, its hierarchy collaborators, and lifecycle hooks.
pub use kernel::{
    ChildForwarder, DispatchOutcome, GAgentKernel, LifecycleHooks, NoopHooks, NullForwarder,
};
/// Lifecycle state machine.
pub use lifecycle::{AgentState, Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult};
/// Cooperative per-agent task scheduler, reused by the subscription manager.
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskScheduler};
