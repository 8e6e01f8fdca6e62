//! End-to-end coverage of the three scenarios that exercise more than one
//! crate at a time: state-snapshot persistence, event-sourced replay, and
//! parent/child broadcast. Dedup-under-concurrency, handler priority
//! order, and subscription reconnect are each fully self-contained within
//! a single crate and are covered there instead.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use gagent::kernel::{EventHandler, HandlerFailure, HandlerOutcome, HandlerTable, LifecycleHooks, CONFIG_EVENT_TYPE};
use gagent::primitives::{AgentId, Direction, EventEnvelope};
use gagent::runtime::{GAgentHandlers, LlmProviderFactory, Runtime, DEFAULT_STREAM_CAPACITY};
use gagent::store::{to_payload, EventStore, InMemoryEventStore, InMemoryStateStore, NewEvent, VersionedStateStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

fn runtime() -> Runtime {
    Runtime::new(
        DEFAULT_STREAM_CAPACITY,
        gagent::policy::BackpressurePolicy::default(),
        gagent::dedup::DedupConfig::default(),
    )
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
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome {
        let amount = envelope
            .payload_as::<serde_json::Value>()
            .map_err(|err| HandlerFailure::new(err.to_string()))?
            .get("amount")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| HandlerFailure::new("missing amount"))?;
        let mut guard = self.state.write().await;
        guard.get_or_insert_with(Counter::default).count += amount;
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

async fn increment(agent: &Arc<dyn gagent::runtime::DynAgent>, amount: i64) {
    let envelope = agent
        .publish("Increment".to_string(), json!({ "amount": amount }), Direction::Down)
        .await
        .unwrap();
    agent.handle_event_async(envelope).await.unwrap();
}

/// S1: snapshot persistence survives a deactivate/reactivate round trip.
#[tokio::test]
async fn s1_counter_snapshot_survives_round_trip() {
    let runtime = runtime();
    let store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());
    let agent_id = AgentId::random();

    let agent = runtime
        .create_actor::<CounterAgent>(Some(agent_id), Arc::clone(&store), Some(()), None)
        .await
        .unwrap();
    for amount in [5, 3, 2] {
        increment(&agent, amount).await;
    }
    agent.deactivate().await.unwrap();
    assert_eq!(store.load(agent_id).await.unwrap(), Some(Counter { count: 10 }));

    let agent = runtime
        .create_actor::<CounterAgent>(Some(agent_id), Arc::clone(&store), Some(()), None)
        .await
        .unwrap();
    assert_eq!(store.load(agent_id).await.unwrap(), Some(Counter { count: 10 }));
    increment(&agent, 7).await;
    agent.deactivate().await.unwrap();
    assert_eq!(store.load(agent_id).await.unwrap(), Some(Counter { count: 17 }));
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
struct Ledger {
    balance: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Amount {
    amount: i64,
}

struct BankAgent;

static EVENT_LOG: OnceLock<Arc<InMemoryEventStore>> = OnceLock::new();
static AGENT_ID: OnceLock<AgentId> = OnceLock::new();

fn event_log() -> Arc<InMemoryEventStore> {
    Arc::clone(EVENT_LOG.get_or_init(|| Arc::new(InMemoryEventStore::new())))
}

struct LedgerHandler {
    state: Arc<RwLock<Option<Ledger>>>,
    event_type: &'static str,
    sign: i64,
}

#[async_trait]
impl EventHandler for LedgerHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome {
        let amount = envelope
            .payload_as::<Amount>()
            .map_err(|err| HandlerFailure::new(err.to_string()))?
            .amount;
        let agent_id = envelope.originator().ok_or_else(|| HandlerFailure::new("no originator"))?;

        let mut guard = self.state.write().await;
        guard.get_or_insert_with(Ledger::default).balance += self.sign * amount;

        let payload = to_payload(&Amount { amount }).map_err(|err| HandlerFailure::new(err.to_string()))?;
        event_log()
            .append(agent_id, NewEvent::new(self.event_type, payload))
            .await
            .map_err(|err| HandlerFailure::new(err.to_string()))?;
        Ok(())
    }
}

struct ReplayLedgerFromLog;

#[async_trait]
impl LifecycleHooks<Ledger, ()> for ReplayLedgerFromLog {
    async fn on_activate(&self, state: &mut Option<Ledger>, _config: &Option<()>) {
        if state.is_some() {
            return;
        }
        let Some(&agent_id) = AGENT_ID.get() else { return };
        let Ok(events) = event_log().read(agent_id, None, None).await else { return };
        let mut ledger = Ledger::default();
        for event in events {
            let Ok(amount) = serde_json::from_value::<Amount>(event.payload().clone()) else { continue };
            match event.event_type() {
                "Deposit" => ledger.balance += amount.amount,
                "Withdraw" => ledger.balance -= amount.amount,
                _ => {}
            }
        }
        *state = Some(ledger);
    }
}

impl GAgentHandlers for BankAgent {
    type State = Ledger;
    type Config = ();

    fn type_name() -> &'static str {
        "bank"
    }

    fn build_handlers(
        state: Arc<RwLock<Option<Self::State>>>,
        _config: Arc<RwLock<Option<Self::Config>>>,
        _llm: Option<Arc<dyn LlmProviderFactory>>,
    ) -> HandlerTable {
        HandlerTable::builder()
            .on_event("Deposit", 0, true, LedgerHandler { state: Arc::clone(&state), event_type: "Deposit", sign: 1 })
            .on_event("Withdraw", 0, true, LedgerHandler { state, event_type: "Withdraw", sign: -1 })
            .build()
    }

    fn hooks() -> Arc<dyn LifecycleHooks<Self::State, Self::Config>> {
        Arc::new(ReplayLedgerFromLog)
    }
}

async fn apply_ledger_event(agent: &Arc<dyn gagent::runtime::DynAgent>, event_type: &str, amount: i64) {
    let envelope = agent
        .publish(event_type.to_string(), json!({ "amount": amount }), Direction::Down)
        .await
        .unwrap();
    agent.handle_event_async(envelope).await.unwrap();
}

/// S2: the event log is the source of truth; clearing the snapshot and
/// reactivating replays it back to the same balance.
#[tokio::test]
async fn s2_event_sourced_bank_replays_from_log() {
    let runtime = runtime();
    let store: Arc<dyn VersionedStateStore<Ledger>> = Arc::new(InMemoryStateStore::<Ledger>::new());
    let agent_id = AgentId::random();
    let _ = AGENT_ID.set(agent_id);

    let agent = runtime
        .create_actor::<BankAgent>(Some(agent_id), Arc::clone(&store), Some(()), None)
        .await
        .unwrap();

    apply_ledger_event(&agent, "Deposit", 100).await;
    apply_ledger_event(&agent, "Withdraw", 30).await;
    apply_ledger_event(&agent, "Deposit", 50).await;
    agent.deactivate().await.unwrap();

    assert_eq!(store.load(agent_id).await.unwrap(), Some(Ledger { balance: 120 }));
    assert_eq!(event_log().latest_version(agent_id).await.unwrap(), 3);
    let events = event_log().read(agent_id, None, None).await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_type(), "Deposit");
    assert_eq!(events[1].event_type(), "Withdraw");
    assert_eq!(events[2].event_type(), "Deposit");

    store.delete(agent_id).await.unwrap();
    let agent = runtime
        .create_actor::<BankAgent>(Some(agent_id), Arc::clone(&store), Some(()), None)
        .await
        .unwrap();
    agent.deactivate().await.unwrap();
    assert_eq!(store.load(agent_id).await.unwrap(), Some(Ledger { balance: 120 }));
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Limit {
    max: i64,
}

struct ConfigHandler {
    config: Arc<RwLock<Option<Limit>>>,
}

#[async_trait]
impl EventHandler for ConfigHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome {
        let limit = envelope
            .payload_as::<Limit>()
            .map_err(|err| HandlerFailure::new(err.to_string()))?;
        *self.config.write().await = Some(limit);
        Ok(())
    }
}

struct CappedIncrementHandler {
    state: Arc<RwLock<Option<Counter>>>,
    config: Arc<RwLock<Option<Limit>>>,
}

#[async_trait]
impl EventHandler for CappedIncrementHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome {
        let amount = envelope
            .payload_as::<serde_json::Value>()
            .map_err(|err| HandlerFailure::new(err.to_string()))?
            .get("amount")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| HandlerFailure::new("missing amount"))?;
        if let Some(limit) = *self.config.read().await {
            if amount > limit.max {
                return Err(HandlerFailure::new("amount exceeds configured limit"));
            }
        }
        self.state.write().await.get_or_insert_with(Counter::default).count += amount;
        Ok(())
    }
}

struct CappedCounterAgent;

impl GAgentHandlers for CappedCounterAgent {
    type State = Counter;
    type Config = Limit;

    fn type_name() -> &'static str {
        "capped_counter"
    }

    fn build_handlers(
        state: Arc<RwLock<Option<Self::State>>>,
        config: Arc<RwLock<Option<Self::Config>>>,
        _llm: Option<Arc<dyn LlmProviderFactory>>,
    ) -> HandlerTable {
        HandlerTable::builder()
            .on_config(0, ConfigHandler { config: Arc::clone(&config) })
            .on_event("Apply", 0, true, CappedIncrementHandler { state, config })
            .build()
    }
}

/// A configuration update published on the dedicated configuration event
/// path reaches a handler registered via `on_config`, and takes effect on
/// handlers that share the config cell, without a separate dispatch path.
#[tokio::test]
async fn config_update_is_delivered_on_the_dedicated_config_event_path() {
    let runtime = runtime();
    let store: Arc<dyn VersionedStateStore<Counter>> = Arc::new(InMemoryStateStore::<Counter>::new());

    let agent = runtime
        .create_actor::<CappedCounterAgent>(None, Arc::clone(&store), None, None)
        .await
        .unwrap();

    let envelope = agent.publish_config(json!({ "max": 5 }), Direction::Down).await.unwrap();
    assert_eq!(envelope.event_type(), CONFIG_EVENT_TYPE);
    let outcome = agent.handle_event_async(envelope).await.unwrap();
    assert!(outcome.failures.is_empty());

    increment_capped(&agent, 3).await;

    let envelope = agent
        .publish("Apply".to_string(), json!({ "amount": 10 }), Direction::Down)
        .await
        .unwrap();
    let outcome = agent.handle_event_async(envelope).await.unwrap();
    assert_eq!(outcome.failures.len(), 1);

    agent.deactivate().await.unwrap();
    assert_eq!(store.load(agent.agent_id()).await.unwrap(), Some(Counter { count: 3 }));
}

async fn increment_capped(agent: &Arc<dyn gagent::runtime::DynAgent>, amount: i64) {
    let envelope = agent
        .publish("Apply".to_string(), json!({ "amount": amount }), Direction::Down)
        .await
        .unwrap();
    let outcome = agent.handle_event_async(envelope).await.unwrap();
    assert!(outcome.failures.is_empty());
}

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
        self.state.write().await.get_or_insert_with(PingCount::default).handled += 1;
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
        HandlerTable::builder()
            .on_event("Ping", 0, false, PingHandler { state })
            .build()
    }
}

async fn spawn_broadcast(runtime: &Runtime) -> (Arc<dyn gagent::runtime::DynAgent>, Arc<dyn VersionedStateStore<PingCount>>) {
    let store: Arc<dyn VersionedStateStore<PingCount>> = Arc::new(InMemoryStateStore::<PingCount>::new());
    let agent = runtime
        .create_actor::<BroadcastAgent>(None, Arc::clone(&store), Some(()), None)
        .await
        .unwrap();
    (agent, store)
}

/// S3: a `Down` broadcast reaches every child exactly once and the
/// originating parent never handles its own emission.
#[tokio::test]
async fn s3_parent_child_broadcast_reaches_each_child_once() {
    let runtime = runtime();
    let (parent, parent_store) = spawn_broadcast(&runtime).await;
    let (child_one, child_one_store) = spawn_broadcast(&runtime).await;
    let (child_two, child_two_store) = spawn_broadcast(&runtime).await;

    runtime.link_parent_child(parent.agent_id(), child_one.agent_id()).await.unwrap();
    runtime.link_parent_child(parent.agent_id(), child_two.agent_id()).await.unwrap();

    parent.publish("Ping".to_string(), json!({}), Direction::Down).await.unwrap();

    // The subscription leg races behind the direct-forward leg; give it
    // room to land before asserting on the (dedup-guarded) final counts.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    parent.deactivate().await.unwrap();
    child_one.deactivate().await.unwrap();
    child_two.deactivate().await.unwrap();

    assert_eq!(parent_store.load(parent.agent_id()).await.unwrap(), None);
    assert_eq!(child_one_store.load(child_one.agent_id()).await.unwrap(), Some(PingCount { handled: 1 }));
    assert_eq!(child_two_store.load(child_two.agent_id()).await.unwrap(), Some(PingCount { handled: 1 }));
}
