//! Shared error taxonomy for the GAgent runtime.
//!
//! Mirrors the taxonomy in the runtime specification: validation errors are
//! never retried, conflicts may be retried with fresh state, not-found may
//! or may not be fatal depending on the caller, transient errors are
//! surfaced only once retries are exhausted, and fatal errors mark the
//! owning actor unusable.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the agent runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating core agent primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided agent identifier could not be parsed.
    #[error("invalid agent id: {source}")]
    InvalidAgentId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Agent type name failed validation.
    #[error("invalid agent type: {reason}")]
    InvalidAgentType {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Envelope construction failed validation (e.g. empty event id).
    #[error("invalid envelope: {reason}")]
    InvalidEnvelope {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
