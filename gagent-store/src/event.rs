//! Event-sourcing persistence: the append-only log behind replay.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use gagent_primitives::AgentId;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// A single entry in an agent's event log.
///
/// Per `agent_id`, `version` is strictly increasing and dense starting at
/// 1; `(agent_id, version)` is the record's natural key.
#[derive(Clone, Debug)]
pub struct StateLogEvent {
    event_id: Uuid,
    agent_id: AgentId,
    version: u64,
    event_type: String,
    payload: Value,
    timestamp: SystemTime,
    metadata: Map<String, Value>,
}

impl StateLogEvent {
    /// Constructs a log event. `version` is assigned by the store on
    /// append, not by the caller — this constructor is used internally by
    /// [`EventStore`] implementations.
    #[must_use]
    fn new(agent_id: AgentId, version: u64, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            agent_id,
            version,
            event_type: event_type.into(),
            payload,
            timestamp: SystemTime::now(),
            metadata: Map::new(),
        }
    }

    /// Returns the event's unique id.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Returns the owning agent id.
    #[must_use]
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Returns the version this event was assigned.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the event's type tag.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the serialized payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the timestamp the event was appended at.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the metadata map attached to the event.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// A new event submitted for appending, before a version has been
/// assigned.
#[derive(Clone, Debug)]
pub struct NewEvent {
    event_type: String,
    payload: Value,
    metadata: Map<String, Value>,
}

impl NewEvent {
    /// Creates a new event with the given type tag and payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: Map::new(),
        }
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the event type tag.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Rebuilds a [`StateLogEvent`] from its constituent fields.
///
/// Used by alternate [`EventStore`] implementations (e.g. a file-backed
/// one) that deserialize their own wire format and need to reconstruct the
/// type without re-deriving a version.
pub(crate) fn rebuild_state_log_event(
    event_id: Uuid,
    agent_id: AgentId,
    version: u64,
    event_type: String,
    payload: Value,
    timestamp: SystemTime,
    metadata: Map<String, Value>,
) -> StateLogEvent {
    StateLogEvent {
        event_id,
        agent_id,
        version,
        event_type,
        payload,
        timestamp,
        metadata,
    }
}

/// Pluggable append-only event log with strictly increasing per-agent
/// versions.
///
/// Append MUST be serializable with respect to other appends for the same
/// `agent_id`; reads MUST be monotonic.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a single event for `agent_id`, returning the assigned
    /// version.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or serialization failures.
    async fn append(&self, agent_id: AgentId, event: NewEvent) -> StoreResult<u64>;

    /// Appends a batch of events for `agent_id` atomically with respect to
    /// version assignment, returning the assigned versions in order.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or serialization failures.
    async fn append_batch(&self, agent_id: AgentId, events: Vec<NewEvent>) -> StoreResult<Vec<u64>>;

    /// Reads events for `agent_id` in chronological order, optionally
    /// bounded by `from_version` (inclusive) and `to_version` (inclusive).
    ///
    /// # Errors
    ///
    /// Propagates backend I/O or deserialization failures.
    async fn read(
        &self,
        agent_id: AgentId,
        from_version: Option<u64>,
        to_version: Option<u64>,
    ) -> StoreResult<Vec<StateLogEvent>>;

    /// Returns the latest version appended for `agent_id`, or 0 if none.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn latest_version(&self, agent_id: AgentId) -> StoreResult<u64>;

    /// Clears the entire log for `agent_id`.
    ///
    /// # Errors
    ///
    /// Propagates backend I/O failures.
    async fn clear(&self, agent_id: AgentId) -> StoreResult<()>;
}

/// In-memory reference implementation of [`EventStore`].
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: Mutex<HashMap<AgentId, Vec<StateLogEvent>>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, agent_id: AgentId, event: NewEvent) -> StoreResult<u64> {
        let mut guard = self.inner.lock().expect("event store poisoned");
        let log = guard.entry(agent_id).or_default();
        let version = log.len() as u64 + 1;
        let mut entry = StateLogEvent::new(agent_id, version, event.event_type, event.payload);
        entry.metadata = event.metadata;
        log.push(entry);
        Ok(version)
    }

    async fn append_batch(&self, agent_id: AgentId, events: Vec<NewEvent>) -> StoreResult<Vec<u64>> {
        let mut guard = self.inner.lock().expect("event store poisoned");
        let log = guard.entry(agent_id).or_default();
        let mut versions = Vec::with_capacity(events.len());
        for event in events {
            let version = log.len() as u64 + 1;
            let mut entry = StateLogEvent::new(agent_id, version, event.event_type, event.payload);
            entry.metadata = event.metadata;
            log.push(entry);
            versions.push(version);
        }
        Ok(versions)
    }

    async fn read(
        &self,
        agent_id: AgentId,
        from_version: Option<u64>,
        to_version: Option<u64>,
    ) -> StoreResult<Vec<StateLogEvent>> {
        let guard = self.inner.lock().expect("event store poisoned");
        let Some(log) = guard.get(&agent_id) else {
            return Ok(Vec::new());
        };

        let from = from_version.unwrap_or(1);
        let to = to_version.unwrap_or(u64::MAX);
        Ok(log
            .iter()
            .filter(|event| event.version >= from && event.version <= to)
            .cloned()
            .collect())
    }

    async fn latest_version(&self, agent_id: AgentId) -> StoreResult<u64> {
        let guard = self.inner.lock().expect("event store poisoned");
        Ok(guard.get(&agent_id).map_or(0, |log| log.len() as u64))
    }

    async fn clear(&self, agent_id: AgentId) -> StoreResult<()> {
        let mut guard = self.inner.lock().expect("event store poisoned");
        guard.remove(&agent_id);
        Ok(())
    }
}

/// Serializes `self` to a JSON value for passing to [`NewEvent`], returning
/// a [`StoreError`] on failure rather than panicking.
pub fn to_payload<T: serde::Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_dense_strictly_increasing_versions() {
        let store = InMemoryEventStore::new();
        let agent_id = AgentId::random();

        let v1 = store
            .append(agent_id, NewEvent::new("deposit", Value::from(100)))
            .await
            .unwrap();
        let v2 = store
            .append(agent_id, NewEvent::new("withdraw", Value::from(30)))
            .await
            .unwrap();
        let v3 = store
            .append(agent_id, NewEvent::new("deposit", Value::from(50)))
            .await
            .unwrap();

        assert_eq!((v1, v2, v3), (1, 2, 3));
        assert_eq!(store.latest_version(agent_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn read_respects_version_bounds() {
        let store = InMemoryEventStore::new();
        let agent_id = AgentId::random();
        for n in 0..5 {
            store
                .append(agent_id, NewEvent::new("tick", Value::from(n)))
                .await
                .unwrap();
        }

        let middle = store.read(agent_id, Some(2), Some(4)).await.unwrap();
        assert_eq!(middle.len(), 3);
        assert_eq!(middle[0].version(), 2);
        assert_eq!(middle.last().unwrap().version(), 4);
    }

    #[tokio::test]
    async fn clear_resets_version_counter() {
        let store = InMemoryEventStore::new();
        let agent_id = AgentId::random();
        store
            .append(agent_id, NewEvent::new("tick", Value::Null))
            .await
            .unwrap();
        store.clear(agent_id).await.unwrap();

        assert_eq!(store.latest_version(agent_id).await.unwrap(), 0);
        assert!(store.read(agent_id, None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_log_reads_as_empty_not_error() {
        let store = InMemoryEventStore::new();
        let events = store.read(AgentId::random(), None, None).await.unwrap();
        assert!(events.is_empty());
    }
}
