//! Process-wide `RuntimeConfig`: the single value a `gagent-runtime::Runtime`
//! is built from.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dedup::DedupKnobs;
use crate::error::{ConfigError, ConfigResult};
use crate::retry::RetryKnobs;
use crate::stream::StreamKnobs;

/// Event-sourcing knobs (spec §6): whether state is reconstructed from a
/// replayed event log rather than loaded from a single snapshot record,
/// and how often a snapshot is taken to bound replay cost.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventSourcingKnobs {
    /// Whether event-sourced persistence is active for agents that opt in.
    #[serde(default)]
    pub enabled: bool,
    /// Snapshot cadence in event count. `None` means never snapshot —
    /// every activation replays the full log, which is the resolved
    /// default (see `DESIGN.md`'s open-question note on this knob).
    #[serde(default)]
    pub snapshot_every_n_events: Option<u64>,
}

/// All process-wide configuration knobs named in spec §6, grouped by the
/// subsystem each governs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Deduplicator tuning.
    #[serde(default)]
    pub dedup: DedupKnobs,
    /// Stream tuning.
    #[serde(default)]
    pub stream: StreamKnobs,
    /// Default retry policy for subscription (re)connection.
    #[serde(default)]
    pub retry: RetryKnobs,
    /// Event-sourcing tuning.
    #[serde(default)]
    pub event_sourcing: EventSourcingKnobs,
}

impl RuntimeConfig {
    /// Parses a `RuntimeConfig` from a TOML document, applying defaults
    /// for any omitted section or field, then validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or
    /// [`ConfigError::Invalid`]/[`ConfigError::Retry`] if the parsed
    /// values fail validation.
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a `RuntimeConfig` from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or the
    /// same parse/validation errors as [`RuntimeConfig::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates every section, surfacing the first failure found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] or [`ConfigError::Retry`] if any
    /// section is inconsistent.
    pub fn validate(&self) -> ConfigResult<()> {
        self.dedup.validate()?;
        self.retry.to_retry_policy()?;
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::Invalid("stream.channel_capacity must be > 0".into()));
        }
        if let Some(n) = self.event_sourcing.snapshot_every_n_events {
            if n == 0 {
                return Err(ConfigError::Invalid(
                    "event_sourcing.snapshot_every_n_events must be > 0 when set".into(),
                ));
            }
        }
        Ok(())
    }
}
