//! Configuration loading and validation errors.

use thiserror::Error;

/// Errors raised loading or validating a [`crate::RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid config toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A loaded config failed a semantic validation rule.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The retry policy knobs were individually valid but rejected when
    /// assembled into a [`gagent_policy::RetryPolicy`].
    #[error("invalid retry policy: {0}")]
    Retry(#[from] gagent_policy::PolicyError),
}

/// Result alias for config loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;
