//! State persistence: snapshot load/save with optimistic concurrency.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use gagent_primitives::AgentId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Persists and loads an agent's state snapshot.
///
/// Every persisted state carries a monotonically increasing `version`
/// starting at 1, used by [`VersionedStateStore`] for optimistic
/// concurrency.
#[async_trait]
pub trait StateStore<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Loads the current state for `id`, if any has been saved.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or deserialization failures.
    async fn load(&self, id: AgentId) -> StoreResult<Option<S>>;

    /// Saves `state` for `id`, bumping its version, and returns the new
    /// version.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or serialization failures.
    async fn save(&self, id: AgentId, state: &S) -> StoreResult<u64>;

    /// Deletes any saved state for `id`.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn delete(&self, id: AgentId) -> StoreResult<()>;

    /// Returns whether state exists for `id`.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn exists(&self, id: AgentId) -> StoreResult<bool>;
}

/// A [`StateStore`] that additionally enforces optimistic concurrency.
#[async_trait]
pub trait VersionedStateStore<S>: StateStore<S>
where
    S: Send + Sync + 'static,
{
    /// Saves `state` for `id` only if the currently stored version equals
    /// `expected_version` (0 meaning "no state saved yet").
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if the stored version has
    /// advanced since `expected_version` was read.
    async fn save_with_version(
        &self,
        id: AgentId,
        state: &S,
        expected_version: u64,
    ) -> StoreResult<u64>;

    /// Returns the current version for `id`, or 0 if no state is stored.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn current_version(&self, id: AgentId) -> StoreResult<u64>;
}

struct Snapshot {
    serialized: Value,
    version: u64,
    #[allow(dead_code)]
    updated_at: SystemTime,
}

/// In-memory reference implementation of [`StateStore`] and
/// [`VersionedStateStore`], backing the test suite and any deployment that
/// does not need durability across process restarts.
pub struct InMemoryStateStore<S> {
    inner: RwLock<HashMap<AgentId, Snapshot>>,
    _marker: PhantomData<S>,
}

impl<S> Default for InMemoryStateStore<S> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<S> InMemoryStateStore<S> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<S> StateStore<S> for InMemoryStateStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self, id: AgentId) -> StoreResult<Option<S>> {
        let guard = self.inner.read().expect("state store poisoned");
        guard
            .get(&id)
            .map(|snapshot| serde_json::from_value(snapshot.serialized.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn save(&self, id: AgentId, state: &S) -> StoreResult<u64> {
        let serialized = serde_json::to_value(state)?;
        let mut guard = self.inner.write().expect("state store poisoned");
        let version = guard.get(&id).map_or(1, |snapshot| snapshot.version + 1);
        guard.insert(
            id,
            Snapshot {
                serialized,
                version,
                updated_at: SystemTime::now(),
            },
        );
        Ok(version)
    }

    async fn delete(&self, id: AgentId) -> StoreResult<()> {
        let mut guard = self.inner.write().expect("state store poisoned");
        guard.remove(&id);
        Ok(())
    }

    async fn exists(&self, id: AgentId) -> StoreResult<bool> {
        let guard = self.inner.read().expect("state store poisoned");
        Ok(guard.contains_key(&id))
    }
}

#[async_trait]
impl<S> VersionedStateStore<S> for InMemoryStateStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn save_with_version(
        &self,
        id: AgentId,
        state: &S,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let serialized = serde_json::to_value(state)?;
        let mut guard = self.inner.write().expect("state store poisoned");
        let actual = guard.get(&id).map_or(0, |snapshot| snapshot.version);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }

        let version = actual + 1;
        guard.insert(
            id,
            Snapshot {
                serialized,
                version,
                updated_at: SystemTime::now(),
            },
        );
        Ok(version)
    }

    async fn current_version(&self, id: AgentId) -> StoreResult<u64> {
        let guard = self.inner.read().expect("state store poisoned");
        Ok(guard.get(&id).map_or(0, |snapshot| snapshot.version))
    }
}
