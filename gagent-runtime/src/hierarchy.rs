//! Runtime-wide [`ChildForwarder`]: resolves a child id against the
//! runtime's live-agent registry and delivers straight into its kernel,
//! bypassing the subscription/stream path for the low-latency
//! direct-forward leg of a `Down`/`Both` publish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gagent_kernel::ChildForwarder;
use gagent_primitives::{AgentId, EventEnvelope};
use tracing::warn;

use crate::dyn_agent::DynAgent;

pub(crate) type LiveAgents = Arc<Mutex<HashMap<AgentId, Arc<dyn DynAgent>>>>;

pub(crate) struct RuntimeForwarder {
    live: LiveAgents,
}

impl RuntimeForwarder {
    pub(crate) fn new(live: LiveAgents) -> Self {
        Self { live }
    }
}

#[async_trait]
impl ChildForwarder for RuntimeForwarder {
    async fn forward_to_child(&self, child: AgentId, envelope: EventEnvelope) {
        let agent = {
            let guard = self.live.lock().expect("runtime agent registry poisoned");
            guard.get(&child).cloned()
        };
        let Some(agent) = agent else {
            warn!(child = %child, "direct forward target is not registered in this runtime");
            return;
        };
        if let Err(err) = agent.handle_event_async(envelope).await {
            warn!(child = %child, error = %err, "direct forward to child failed");
        }
    }
}
