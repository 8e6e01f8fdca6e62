//! Deduplication knobs (spec §6).

use std::time::Duration;

use gagent_dedup::DedupConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Process-wide deduplicator tuning, serialized as seconds/fractions
/// rather than [`Duration`] since TOML has no native duration type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupKnobs {
    /// How long a recorded event id stays in the cache.
    #[serde(default = "default_event_expiration_secs")]
    pub event_expiration_secs: u64,
    /// Maximum number of cached event ids before compaction triggers.
    #[serde(default = "default_max_cached_events")]
    pub max_cached_events: usize,
    /// Whether the background cleanup sweep runs automatically.
    #[serde(default = "default_true")]
    pub enable_auto_cleanup: bool,
    /// How often the cleanup sweep runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Fraction of `max_cached_events` retained after compaction.
    #[serde(default = "default_compaction_fraction")]
    pub compaction_fraction: f64,
}

fn default_event_expiration_secs() -> u64 {
    300
}
fn default_max_cached_events() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_cleanup_interval_secs() -> u64 {
    60
}
fn default_compaction_fraction() -> f64 {
    0.25
}

impl Default for DedupKnobs {
    fn default() -> Self {
        Self {
            event_expiration_secs: default_event_expiration_secs(),
            max_cached_events: default_max_cached_events(),
            enable_auto_cleanup: default_true(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            compaction_fraction: default_compaction_fraction(),
        }
    }
}

impl DedupKnobs {
    /// Validates the knobs independently of construction, so a config
    /// loaded straight from TOML can be checked before use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `compaction_fraction` is out of
    /// `(0.0, 1.0]` or `max_cached_events` is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_cached_events == 0 {
            return Err(ConfigError::Invalid("dedup.max_cached_events must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.compaction_fraction) || self.compaction_fraction == 0.0 {
            return Err(ConfigError::Invalid(
                "dedup.compaction_fraction must be in (0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }

    /// Converts these knobs into the [`DedupConfig`] the deduplicator
    /// actually consumes.
    #[must_use]
    pub fn to_dedup_config(&self) -> DedupConfig {
        DedupConfig {
            event_expiration: Duration::from_secs(self.event_expiration_secs),
            max_cached_events: self.max_cached_events,
            enable_auto_cleanup: self.enable_auto_cleanup,
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            compaction_fraction: self.compaction_fraction,
        }
    }
}
