//! GAgent runtime SDK facade.
//!
//! Depend on this crate via `cargo add gagent`. It bundles the internal
//! runtime crates behind feature flags so downstream users can enable or
//! disable components as needed for their agents.

#![warn(missing_docs, clippy::pedantic)]

/// Identity, event envelopes, and directional routing primitives.
pub use gagent_primitives as primitives;

/// State and config persistence stores (enabled by `store` feature).
#[cfg(feature = "store")]
pub use gagent_store as store;

/// Event deduplication (enabled by `dedup` feature).
#[cfg(feature = "dedup")]
pub use gagent_dedup as dedup;

/// Per-agent message streams (enabled by `stream` feature).
#[cfg(feature = "stream")]
pub use gagent_stream as stream;

/// Retry and backpressure policy (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use gagent_policy as policy;

/// Agent lifecycle, hierarchy, and actor wrapper (enabled by `kernel`
/// feature).
#[cfg(feature = "kernel")]
pub use gagent_kernel as kernel;

/// Parent/child subscription management (enabled by `subscription`
/// feature).
#[cfg(feature = "subscription")]
pub use gagent_subscription as subscription;

/// Factory, injectors, and runtime bootstrap (enabled by `runtime`
/// feature).
#[cfg(feature = "runtime")]
pub use gagent_runtime as runtime;

/// Metrics and structured-log scopes (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use gagent_telemetry as telemetry;

/// Process-wide configuration knobs (enabled by `config` feature).
#[cfg(feature = "config")]
pub use gagent_config as config;
