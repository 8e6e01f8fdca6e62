//! Per-agent bounded, multi-consumer event streams with backpressure and
//! type filtering, plus the registry that owns one stream per live agent.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod registry;
mod stream;

/// Errors raised by streams and the stream registry.
pub use error::{StreamError, StreamResult};
/// Registry owning one stream per agent.
pub use registry::StreamRegistry;
/// The stream type, its handler trait, and subscription handles.
pub use stream::{accept_only, MessageStream, StreamHandler, Subscription, SubscriptionId, TypeFilter};
