//! Retry and backpressure policy types shared by the subscription manager
//! and the message stream.

#![warn(missing_docs, clippy::pedantic)]

mod backpressure;
mod retry;

/// Backpressure policy governing bounded-stream producer behavior.
pub use backpressure::BackpressurePolicy;
/// Exponential-backoff retry policy and its error type.
pub use retry::{PolicyError, RetryPolicy};
