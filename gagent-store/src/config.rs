//! Config persistence: read-mostly values keyed by `(AgentType, AgentId)`.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

use async_trait::async_trait;
use gagent_primitives::{AgentId, AgentType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreResult;

/// Persists and loads per-`(AgentType, AgentId)` configuration.
///
/// Implementations MUST enforce uniqueness of `(agent_type, agent_id)` —
/// two agents of different types with the same id see distinct configs.
#[async_trait]
pub trait ConfigStore<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    /// Loads the config for `(agent_type, agent_id)`, if any is saved.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or deserialization failures.
    async fn load(&self, agent_type: &AgentType, agent_id: AgentId) -> StoreResult<Option<C>>;

    /// Saves `config` for `(agent_type, agent_id)`.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or serialization failures.
    async fn save(&self, agent_type: &AgentType, agent_id: AgentId, config: &C) -> StoreResult<()>;

    /// Deletes the config for `(agent_type, agent_id)`.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn delete(&self, agent_type: &AgentType, agent_id: AgentId) -> StoreResult<()>;

    /// Returns whether a config exists for `(agent_type, agent_id)`.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn exists(&self, agent_type: &AgentType, agent_id: AgentId) -> StoreResult<bool>;
}

/// In-memory reference implementation of [`ConfigStore`].
pub struct InMemoryConfigStore<C> {
    inner: RwLock<HashMap<(AgentType, AgentId), Value>>,
    _marker: PhantomData<C>,
}

impl<C> Default for InMemoryConfigStore<C> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<C> InMemoryConfigStore<C> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<C> ConfigStore<C> for InMemoryConfigStore<C>
where
    C: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self, agent_type: &AgentType, agent_id: AgentId) -> StoreResult<Option<C>> {
        let guard = self.inner.read().expect("config store poisoned");
        guard
            .get(&(agent_type.clone(), agent_id))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    async fn save(&self, agent_type: &AgentType, agent_id: AgentId, config: &C) -> StoreResult<()> {
        let value = serde_json::to_value(config)?;
        let mut guard = self.inner.write().expect("config store poisoned");
        guard.insert((agent_type.clone(), agent_id), value);
        Ok(())
    }

    async fn delete(&self, agent_type: &AgentType, agent_id: AgentId) -> StoreResult<()> {
        let mut guard = self.inner.write().expect("config store poisoned");
        guard.remove(&(agent_type.clone(), agent_id));
        Ok(())
    }

    async fn exists(&self, agent_type: &AgentType, agent_id: AgentId) -> StoreResult<bool> {
        let guard = self.inner.read().expect("config store poisoned");
        Ok(guard.contains_key(&(agent_type.clone(), agent_id)))
    }
}
