//! Process-wide configuration knobs for the GAgent runtime: deduplication,
//! stream, retry, and event-sourcing tuning, loadable from TOML and
//! validated before a [`RuntimeConfig`] is handed to the runtime
//! bootstrap.

#![warn(missing_docs, clippy::pedantic)]

mod dedup;
mod error;
mod retry;
mod runtime;
mod stream;

pub use dedup::DedupKnobs;
pub use error::{ConfigError, ConfigResult};
pub use retry::RetryKnobs;
pub use runtime::{EventSourcingKnobs, RuntimeConfig};
pub use stream::StreamKnobs;
