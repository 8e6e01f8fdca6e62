//! Factory, injectors, and process-wide composition root for the GAgent
//! runtime: brings an agent type's state, config, and handler table
//! together into a running, activated actor.

#![warn(missing_docs, clippy::pedantic)]

mod dyn_agent;
mod error;
mod factory;
mod handlers_trait;
mod hierarchy;
mod llm;

/// Non-generic façade over a running actor.
pub use dyn_agent::DynAgent;
/// Runtime-level errors.
pub use error::{RuntimeError, RuntimeResult};
/// Composition root and its `create_actor` entry point.
pub use factory::{Runtime, DEFAULT_STREAM_CAPACITY};
/// Per-agent-type handler table declaration.
pub use handlers_trait::GAgentHandlers;
/// Opaque LLM/model provider injection point.
pub use llm::LlmProviderFactory;
