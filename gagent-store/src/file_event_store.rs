//! File-backed [`EventStore`], persisting events as newline-delimited JSON.
//!
//! A second, swappable `EventStore` implementation alongside
//! [`crate::event::InMemoryEventStore`], demonstrating that the trait
//! boundary genuinely separates agent code from storage choice. Not wired
//! into any default runtime path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use gagent_primitives::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::event::{rebuild_state_log_event, EventStore, NewEvent, StateLogEvent};

#[derive(Serialize, Deserialize)]
struct WireEvent {
    event_id: Uuid,
    agent_id: AgentId,
    version: u64,
    event_type: String,
    payload: Value,
    timestamp: SystemTime,
    metadata: serde_json::Map<String, Value>,
}

/// File-backed event store. Each agent's log lives in its own file under
/// `base_dir`, one JSON object per line, matching the append-then-tail
/// convention the teacher's memory journal uses.
pub struct FileEventStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<AgentId, ()>>,
}

impl FileEventStore {
    /// Opens (creating if needed) a file-backed store rooted at
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors creating the base directory.
    pub async fn open(base_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, agent_id: AgentId) -> PathBuf {
        self.base_dir.join(format!("{agent_id}.ndjson"))
    }

    async fn read_all(&self, agent_id: AgentId) -> StoreResult<Vec<StateLogEvent>> {
        let path = self.path_for(agent_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&path).await?;
        let mut events = Vec::new();
        for chunk in data.split(|b| *b == b'\n').filter(|c| !c.is_empty()) {
            let wire: WireEvent = serde_json::from_slice(chunk)?;
            events.push(rebuild_state_log_event(
                wire.event_id,
                wire.agent_id,
                wire.version,
                wire.event_type,
                wire.payload,
                wire.timestamp,
                wire.metadata,
            ));
        }
        Ok(events)
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, agent_id: AgentId, event: NewEvent) -> StoreResult<u64> {
        let _guard = self.locks.lock().await;
        let existing = self.read_all(agent_id).await?;
        let version = existing.len() as u64 + 1;

        let wire = WireEvent {
            event_id: Uuid::new_v4(),
            agent_id,
            version,
            event_type: event.event_type().to_owned(),
            payload: event.payload().clone(),
            timestamp: SystemTime::now(),
            metadata: event.metadata().clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(agent_id))
            .await?;
        file.write_all(&serde_json::to_vec(&wire)?).await?;
        file.write_u8(b'\n').await?;
        file.flush().await?;
        Ok(version)
    }

    async fn append_batch(&self, agent_id: AgentId, events: Vec<NewEvent>) -> StoreResult<Vec<u64>> {
        let mut versions = Vec::with_capacity(events.len());
        for event in events {
            versions.push(self.append(agent_id, event).await?);
        }
        Ok(versions)
    }

    async fn read(
        &self,
        agent_id: AgentId,
        from_version: Option<u64>,
        to_version: Option<u64>,
    ) -> StoreResult<Vec<StateLogEvent>> {
        let all = self.read_all(agent_id).await?;
        let from = from_version.unwrap_or(1);
        let to = to_version.unwrap_or(u64::MAX);
        Ok(all
            .into_iter()
            .filter(|e| e.version() >= from && e.version() <= to)
            .collect())
    }

    async fn latest_version(&self, agent_id: AgentId) -> StoreResult<u64> {
        Ok(self.read_all(agent_id).await?.len() as u64)
    }

    async fn clear(&self, agent_id: AgentId) -> StoreResult<()> {
        let _guard = self.locks.lock().await;
        let path = self.path_for(agent_id);
        if path.exists() {
            let file = OpenOptions::new().write(true).open(&path).await?;
            let mut file = file;
            file.rewind().await?;
            file.set_len(0).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("gagent-event-store-{}", Uuid::new_v4()));
        path
    }

    #[tokio::test]
    async fn append_and_read_roundtrip() {
        let dir = temp_dir();
        let store = FileEventStore::open(&dir).await.unwrap();
        let agent_id = AgentId::random();

        store
            .append(agent_id, NewEvent::new("deposit", json!(100)))
            .await
            .unwrap();
        store
            .append(agent_id, NewEvent::new("withdraw", json!(30)))
            .await
            .unwrap();

        let events = store.read(agent_id, None, None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].version(), 1);
        assert_eq!(events[1].version(), 2);
        assert_eq!(store.latest_version(agent_id).await.unwrap(), 2);

        store.clear(agent_id).await.unwrap();
        assert_eq!(store.latest_version(agent_id).await.unwrap(), 0);

        let _ = std::fs::remove_dir_all(dir);
    }
}
