//! Error types for streams and their registry.

use thiserror::Error;

/// Errors raised by [`crate::MessageStream`] and [`crate::StreamRegistry`].
#[derive(Debug, Error)]
pub enum StreamError {
    /// The target stream no longer exists (e.g. it was removed from the
    /// registry while a handle to it was still held).
    #[error("stream for agent {0} does not exist")]
    StreamGone(String),

    /// The subscription has already been disposed.
    #[error("subscription already disposed")]
    AlreadyDisposed,
}

/// Result alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
