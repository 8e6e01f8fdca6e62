//! Parent/child broadcast demo: one parent `P` with two children `C1`,
//! `C2`. `P.publish(Ping, Down)` reaches both children exactly once
//! through two independent legs (direct-forward and stream subscription)
//! without double-delivery, and `P` itself never handles its own
//! broadcast. A second pass has `C1` re-emit the same event type `Both`
//! to show that upward observation terminates rather than re-climbing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use gagent::kernel::{EventHandler, HandlerFailure, HandlerOutcome, HandlerTable};
use gagent::primitives::{AgentId, Direction, EventEnvelope};
use gagent::runtime::{DynAgent, GAgentHandlers, LlmProviderFactory, Runtime};
use gagent::store::{InMemoryStateStore, VersionedStateStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
struct PingCount {
    handled: u32,
}

struct BroadcastAgent;

struct PingHandler {
    state: Arc<RwLock<Option<PingCount>>>,
}

#[async_trait]
impl EventHandler for PingHandler {
    async fn handle(&self, _envelope: &EventEnvelope) -> HandlerOutcome {
        let mut guard = self.state.write().await;
        let count = guard.get_or_insert_with(PingCount::default);
        count.handled += 1;
        Ok(())
    }
}

impl GAgentHandlers for BroadcastAgent {
    type State = PingCount;
    type Config = ();

    fn type_name() -> &'static str {
        "broadcast"
    }

    fn build_handlers(
        state: Arc<RwLock<Option<Self::State>>>,
        _config: Arc<RwLock<Option<Self::Config>>>,
        _llm: Option<Arc<dyn LlmProviderFactory>>,
    ) -> HandlerTable {
        // `allow_self = false`: the parent must not count its own
        // broadcast as a handled ping.
        HandlerTable::builder()
            .on_event("Ping", 0, false, PingHandler { state })
            .build()
    }
}

async fn spawn(runtime: &Runtime) -> Result<(Arc<dyn DynAgent>, Arc<dyn VersionedStateStore<PingCount>>)> {
    let store: Arc<dyn VersionedStateStore<PingCount>> = Arc::new(InMemoryStateStore::<PingCount>::new());
    let agent = runtime
        .create_actor::<BroadcastAgent>(None, Arc::clone(&store), Some(()), None)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok((agent, store))
}

async fn handled_count(agent: &Arc<dyn DynAgent>, store: &Arc<dyn VersionedStateStore<PingCount>>) -> Result<u32> {
    agent.deactivate().await.map_err(|err| anyhow!(err.to_string()))?;
    let state = store.load(agent.agent_id()).await.map_err(|err| anyhow!(err.to_string()))?;
    Ok(state.map(|s| s.handled).unwrap_or(0))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let runtime = Runtime::new(
        gagent::runtime::DEFAULT_STREAM_CAPACITY,
        gagent::policy::BackpressurePolicy::default(),
        gagent::dedup::DedupConfig::default(),
    );

    let (parent, parent_store) = spawn(&runtime).await?;
    let (child_one, child_one_store) = spawn(&runtime).await?;
    let (child_two, child_two_store) = spawn(&runtime).await?;

    runtime
        .link_parent_child(parent.agent_id(), child_one.agent_id())
        .await
        .map_err(|err| anyhow!(err.to_string()))?;
    runtime
        .link_parent_child(parent.agent_id(), child_two.agent_id())
        .await
        .map_err(|err| anyhow!(err.to_string()))?;

    parent
        .publish("Ping".to_string(), json!({}), Direction::Down)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;

    // The direct-forward leg has already resolved by the time `publish`
    // returns; the subscription leg is a spawned task racing behind it,
    // and per-agent dedup makes its eventual, redundant delivery a no-op.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let parent_handled = handled_count(&parent, &parent_store).await?;
    let child_one_handled = handled_count(&child_one, &child_one_store).await?;
    let child_two_handled = handled_count(&child_two, &child_two_store).await?;
    info!(parent_handled, child_one_handled, child_two_handled, "initial broadcast settled");
    println!(
        "after broadcast: parent={parent_handled} child_one={child_one_handled} child_two={child_two_handled}"
    );

    // Reactivate C1 and have it re-emit `Ping` as `Both`: the down leg has
    // no children of its own to forward to, and the up leg is only
    // observed once, by the parent — nothing re-climbs or loops back.
    let (child_one, child_one_store) = (
        runtime
            .create_actor::<BroadcastAgent>(Some(child_one.agent_id()), Arc::clone(&child_one_store), Some(()), None)
            .await
            .map_err(|err| anyhow!(err.to_string()))?,
        child_one_store,
    );
    let (parent, parent_store) = (
        runtime
            .create_actor::<BroadcastAgent>(Some(parent.agent_id()), Arc::clone(&parent_store), Some(()), None)
            .await
            .map_err(|err| anyhow!(err.to_string()))?,
        parent_store,
    );
    runtime
        .link_parent_child(parent.agent_id(), child_one.agent_id())
        .await
        .map_err(|err| anyhow!(err.to_string()))?;

    child_one
        .publish("Ping".to_string(), json!({}), Direction::Both)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;

    tokio::time::sleep(Duration::from_millis(20)).await;

    let parent_handled_after_reemit = handled_count(&parent, &parent_store).await?;
    let child_one_handled_after_reemit = handled_count(&child_one, &child_one_store).await?;
    println!(
        "after re-emit: parent={parent_handled_after_reemit} child_one={child_one_handled_after_reemit}"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parent_never_handles_its_own_broadcast_and_each_child_handles_once() {
        let runtime = Runtime::new(
            gagent::runtime::DEFAULT_STREAM_CAPACITY,
            gagent::policy::BackpressurePolicy::default(),
            gagent::dedup::DedupConfig::default(),
        );

        let (parent, parent_store) = spawn(&runtime).await.unwrap();
        let (child_one, child_one_store) = spawn(&runtime).await.unwrap();
        let (child_two, child_two_store) = spawn(&runtime).await.unwrap();

        runtime.link_parent_child(parent.agent_id(), child_one.agent_id()).await.unwrap();
        runtime.link_parent_child(parent.agent_id(), child_two.agent_id()).await.unwrap();

        parent
            .publish("Ping".to_string(), json!({}), Direction::Down)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(handled_count(&parent, &parent_store).await.unwrap(), 0);
        assert_eq!(handled_count(&child_one, &child_one_store).await.unwrap(), 1);
        assert_eq!(handled_count(&child_two, &child_two_store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ancestor_reemission_is_observed_once_with_no_loop() {
        let runtime = Runtime::new(
            gagent::runtime::DEFAULT_STREAM_CAPACITY,
            gagent::policy::BackpressurePolicy::default(),
            gagent::dedup::DedupConfig::default(),
        );

        let (parent, parent_store) = spawn(&runtime).await.unwrap();
        let (child, child_store) = spawn(&runtime).await.unwrap();
        runtime.link_parent_child(parent.agent_id(), child.agent_id()).await.unwrap();

        child
            .publish("Ping".to_string(), json!({}), Direction::Both)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(handled_count(&parent, &parent_store).await.unwrap(), 1);
        assert_eq!(handled_count(&child, &child_store).await.unwrap(), 0);
    }
}
