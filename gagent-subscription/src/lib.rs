//! Parent/child subscription manager: locates a parent's stream (with
//! retry), attaches a loop-safety-filtered handler, and keeps the
//! subscription healthy across parent reactivations.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod filter;
mod health;
mod manager;

/// Errors raised by subscription operations.
pub use error::{SubscriptionError, SubscriptionResult};
/// Background reconnect sweep over a manager's active subscriptions.
pub use health::spawn_health_check;
/// The subscription registry and its opaque handle type.
pub use manager::{SubscriptionHandle, SubscriptionManager};
