//! Bounded, time-windowed, thread-safe deduplication of event ids.
//!
//! One [`Deduplicator`] instance is owned per agent (per-agent isolation
//! was chosen over a process-wide cache — see the runtime specification's
//! open question on dedup scope). `try_record` is atomic: there is no
//! window between the seen-check and the insert, since both happen while
//! holding the same lock.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by the deduplicator.
#[derive(Debug, Error)]
pub enum DedupError {
    /// An empty or whitespace-only id was supplied.
    #[error("event id must not be empty")]
    EmptyId,
}

/// Result alias for deduplicator operations.
pub type DedupResult<T> = Result<T, DedupError>;

/// Configuration governing cache size, expiration, and eviction.
#[derive(Clone, Debug)]
pub struct DedupConfig {
    /// How long a recorded id remains "seen" before it expires and
    /// becomes recordable again.
    pub event_expiration: Duration,
    /// Maximum number of ids retained before compaction triggers.
    pub max_cached_events: usize,
    /// Whether a background-style periodic cleanup is expected to run
    /// (the caller drives the actual timer; this only gates whether
    /// [`Deduplicator::cleanup_expired`] is meaningful to schedule).
    pub enable_auto_cleanup: bool,
    /// Suggested interval between cleanup passes.
    pub cleanup_interval: Duration,
    /// Fraction of `max_cached_events` retained after compaction, keeping
    /// the most recently recorded entries.
    pub compaction_fraction: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            event_expiration: Duration::from_secs(300),
            max_cached_events: 10_000,
            enable_auto_cleanup: true,
            cleanup_interval: Duration::from_secs(60),
            compaction_fraction: 0.25,
        }
    }
}

/// Point-in-time counters describing the deduplicator's state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DedupStatistics {
    /// Number of ids recorded for the first time since the last reset.
    pub unique: u64,
    /// Number of ids rejected as duplicates since the last reset.
    pub duplicates: u64,
    /// Number of ids currently held in the cache.
    pub current_size: usize,
}

struct Inner {
    seen: HashMap<String, Instant>,
    unique: u64,
    duplicates: u64,
}

/// Bounded, time-windowed cache of recently observed event ids.
pub struct Deduplicator {
    config: DedupConfig,
    inner: Mutex<Inner>,
}

impl Deduplicator {
    /// Creates a deduplicator with the given configuration.
    #[must_use]
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                seen: HashMap::new(),
                unique: 0,
                duplicates: 0,
            }),
        }
    }

    fn validate(id: &str) -> DedupResult<()> {
        if id.trim().is_empty() {
            return Err(DedupError::EmptyId);
        }
        Ok(())
    }

    /// Atomically records `id` if it has not been seen within the
    /// expiration window, returning `true` if it was new.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::EmptyId`] if `id` is empty or whitespace.
    pub async fn try_record(&self, id: &str) -> DedupResult<bool> {
        Self::validate(id)?;
        let mut guard = self.inner.lock().await;
        let is_new = Self::record_locked(&mut guard, id, self.config.event_expiration);
        if is_new {
            guard.unique += 1;
        } else {
            guard.duplicates += 1;
        }
        Self::compact_if_needed(&mut guard, &self.config);
        Ok(is_new)
    }

    fn record_locked(inner: &mut Inner, id: &str, expiration: Duration) -> bool {
        let now = Instant::now();
        match inner.seen.get(id) {
            Some(recorded_at) if now.duration_since(*recorded_at) < expiration => false,
            _ => {
                inner.seen.insert(id.to_owned(), now);
                true
            }
        }
    }

    fn compact_if_needed(inner: &mut Inner, config: &DedupConfig) {
        if inner.seen.len() <= config.max_cached_events {
            return;
        }

        let keep = ((config.max_cached_events as f64) * config.compaction_fraction) as usize;
        let mut entries: Vec<(String, Instant)> = inner.seen.drain().collect();
        entries.sort_by_key(|(_, at)| std::cmp::Reverse(*at));
        entries.truncate(keep.max(1));
        inner.seen = entries.into_iter().collect();
    }

    /// Records a batch of ids, returning the subset that were new.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::EmptyId`] if any supplied id is empty or
    /// whitespace; no ids are recorded if validation fails partway
    /// through.
    pub async fn try_record_batch(&self, ids: &[impl AsRef<str>]) -> DedupResult<Vec<String>> {
        for id in ids {
            Self::validate(id.as_ref())?;
        }

        let mut guard = self.inner.lock().await;
        let mut new_ids = Vec::new();
        for id in ids {
            let id = id.as_ref();
            let is_new = Self::record_locked(&mut guard, id, self.config.event_expiration);
            if is_new {
                guard.unique += 1;
                new_ids.push(id.to_owned());
            } else {
                guard.duplicates += 1;
            }
        }
        Self::compact_if_needed(&mut guard, &self.config);
        Ok(new_ids)
    }

    /// Returns whether `id` is currently recorded and unexpired, without
    /// recording it.
    pub async fn is_seen(&self, id: &str) -> bool {
        let guard = self.inner.lock().await;
        match guard.seen.get(id) {
            Some(recorded_at) => recorded_at.elapsed() < self.config.event_expiration,
            None => false,
        }
    }

    /// Removes expired entries, returning the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut guard = self.inner.lock().await;
        let expiration = self.config.event_expiration;
        let before = guard.seen.len();
        guard.seen.retain(|_, at| at.elapsed() < expiration);
        before - guard.seen.len()
    }

    /// Clears all recorded ids and resets counters.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        guard.seen.clear();
        guard.unique = 0;
        guard.duplicates = 0;
    }

    /// Returns a snapshot of the current counters and cache size.
    pub async fn statistics(&self) -> DedupStatistics {
        let guard = self.inner.lock().await;
        DedupStatistics {
            unique: guard.unique,
            duplicates: guard.duplicates,
            current_size: guard.seen.len(),
        }
    }
}
