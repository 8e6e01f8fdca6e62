//! Core identity, envelope, and error primitives shared across the GAgent
//! runtime crates.

#![warn(missing_docs, clippy::pedantic)]

mod envelope;
mod error;
mod ids;

/// Error type and result alias shared across the runtime.
pub use error::{Error, Result};
/// Unique identifier for an agent, stable across activations.
pub use ids::{AgentId, AgentType};

/// Envelope, direction, and publisher-chain types.
pub use envelope::{Direction, EventEnvelope, PublisherChain};
