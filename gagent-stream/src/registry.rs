//! Registry mapping each live agent to its [`MessageStream`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gagent_policy::BackpressurePolicy;
use gagent_primitives::AgentId;

use crate::stream::MessageStream;

/// Owns one [`MessageStream`] per agent, created on first access and torn
/// down explicitly when the agent deactivates.
pub struct StreamRegistry {
    capacity: usize,
    backpressure: BackpressurePolicy,
    streams: RwLock<HashMap<AgentId, Arc<MessageStream>>>,
}

impl StreamRegistry {
    /// Creates an empty registry; streams created through it use
    /// `capacity` and `backpressure` as defaults.
    #[must_use]
    pub fn new(capacity: usize, backpressure: BackpressurePolicy) -> Self {
        Self {
            capacity,
            backpressure,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the stream for `agent_id`, creating it if this is the
    /// first access.
    pub fn get_or_create(&self, agent_id: AgentId) -> Arc<MessageStream> {
        if let Some(stream) = self.streams.read().expect("registry poisoned").get(&agent_id) {
            return Arc::clone(stream);
        }

        let mut guard = self.streams.write().expect("registry poisoned");
        Arc::clone(
            guard
                .entry(agent_id)
                .or_insert_with(|| Arc::new(MessageStream::new(self.capacity, self.backpressure))),
        )
    }

    /// Returns the stream for `agent_id` if one has already been created.
    #[must_use]
    pub fn get(&self, agent_id: AgentId) -> Option<Arc<MessageStream>> {
        self.streams.read().expect("registry poisoned").get(&agent_id).cloned()
    }

    /// Removes and drops the stream for `agent_id`, if any. Any
    /// subscriptions still held against it keep working until dropped,
    /// but the registry no longer hands out new references.
    pub fn remove(&self, agent_id: AgentId) {
        self.streams.write().expect("registry poisoned").remove(&agent_id);
    }

    /// Returns the number of streams currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.read().expect("registry poisoned").len()
    }

    /// Returns whether the registry currently tracks no streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
