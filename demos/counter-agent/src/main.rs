//! Counter agent demo: state-snapshot persistence across deactivate and
//! reactivate.
//!
//! Publishes a run of `Increment` events to itself, deactivates (which
//! persists the final snapshot), then reactivates the same agent id and
//! confirms the snapshot survived the round trip.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clap::Parser;
use gagent::kernel::{EventHandler, HandlerFailure, HandlerOutcome, HandlerTable};
use gagent::primitives::{AgentId, Direction};
use gagent::runtime::{GAgentHandlers, LlmProviderFactory, Runtime};
use gagent::store::{InMemoryStateStore, VersionedStateStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Amounts to increment by, applied in order in the first activation.
    #[arg(long, num_args = 1.., default_values_t = [5, 3, 2])]
    amounts: Vec<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
struct Counter {
    count: i64,
}

struct CounterAgent;

struct IncrementHandler {
    state: Arc<RwLock<Option<Counter>>>,
}

#[async_trait]
impl EventHandler for IncrementHandler {
    async fn handle(&self, envelope: &gagent::primitives::EventEnvelope) -> HandlerOutcome {
        let amount = envelope
            .payload_as::<serde_json::Value>()
            .map_err(|err| HandlerFailure::new(err.to_string()))?
            .get("amount")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| HandlerFailure::new("missing amount"))?;

        let mut guard = self.state.write().await;
        let counter = guard.get_or_insert_with(Counter::default);
        counter.count += amount;
        Ok(())
    }
}

impl GAgentHandlers for CounterAgent {
    type State = Counter;
    type Config = ();

    fn type_name() -> &'static str {
        "counter"
    }

    fn build_handlers(
        state: Arc<RwLock<Option<Self::State>>>,
        _config: Arc<RwLock<Option<Self::Config>>>,
        _llm: Option<Arc<dyn LlmProviderFactory>>,
    ) -> HandlerTable {
        HandlerTable::builder()
            .on_event("Increment", 0, true, IncrementHandler { state })
            .build()
    }
}

async fn increment(agent: &Arc<dyn gagent::runtime::DynAgent>, amount: i64) -> Result<()> {
    let envelope = agent
        .publish("Increment".to_string(), json!({ "amount": amount }), Direction::Down)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;
    agent
        .handle_event_async(envelope)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    let runtime = Runtime::new(
        gagent::runtime::DEFAULT_STREAM_CAPACITY,
        gagent::policy::BackpressurePolicy::default(),
        gagent::dedup::DedupConfig::default(),
    );
    let store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());
    let agent_id = AgentId::random();

    let agent = runtime
        .create_actor::<CounterAgent>(Some(agent_id), Arc::clone(&store), Some(()), None)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;

    for amount in &args.amounts {
        increment(&agent, *amount).await?;
    }

    let total: i64 = args.amounts.iter().sum();
    info!(count = total, "counter incremented");

    agent.deactivate().await.map_err(|err| anyhow!(err.to_string()))?;

    let agent = runtime
        .create_actor::<CounterAgent>(Some(agent_id), Arc::clone(&store), Some(()), None)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;

    increment(&agent, 7).await?;
    let final_total = total + 7;
    info!(count = final_total, "counter reactivated and incremented");

    agent.deactivate().await.map_err(|err| anyhow!(err.to_string()))?;

    let persisted = store
        .load(agent_id)
        .await
        .map_err(|err| anyhow!(err.to_string()))?;
    println!("final state: {persisted:?}");

    Ok(())
}
