//! Error types for the persistence subsystem.

use thiserror::Error;

/// Errors emitted by state, config, and event stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The provided configuration or record failed validation.
    #[error("invalid store input: {0}")]
    InvalidInput(&'static str),

    /// Underlying I/O failure (file-backed stores only).
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },

    /// A versioned save supplied a stale `expected_version`.
    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict {
        /// Version the caller expected to be current.
        expected: u64,
        /// Version actually stored.
        actual: u64,
    },

    /// Record not found for the requested key.
    #[error("not found")]
    NotFound,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
