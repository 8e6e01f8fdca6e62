//! Counters, histograms, and gauges for runtime activity, plus the
//! structured log scope every event-handling dispatch runs under.
//!
//! Metric names and label sets are fixed here so every crate that emits
//! them (`gagent-kernel`, `gagent-runtime`, `gagent-subscription`) agrees
//! on the schema.

use gagent_primitives::AgentId;
use metrics::{counter, gauge, histogram};
use tracing::{info_span, Span};

/// An event was published (not yet dispatched).
pub fn record_event_published(event_type: &str, agent_id: AgentId) {
    let agent_id = agent_id.to_string();
    counter!("events.published", "event_type" => event_type.to_owned(), "agent_id" => agent_id).increment(1);
}

/// An event reached at least one handler and was dispatched.
pub fn record_event_handled(event_type: &str, agent_id: AgentId) {
    let agent_id = agent_id.to_string();
    counter!("events.handled", "event_type" => event_type.to_owned(), "agent_id" => agent_id).increment(1);
}

/// An event was discarded before reaching a handler (loop guard, dedup,
/// backpressure, or a closed stream).
pub fn record_event_dropped(event_type: &str, agent_id: AgentId, reason: &str) {
    let agent_id = agent_id.to_string();
    counter!(
        "events.dropped",
        "event_type" => event_type.to_owned(),
        "agent_id" => agent_id,
        "reason" => reason.to_owned(),
    )
    .increment(1);
}

/// A handler or runtime operation raised an error.
pub fn record_exception(operation: &str) {
    counter!("exceptions", "operation" => operation.to_owned()).increment(1);
}

/// The deduplicator rejected an already-seen event id.
pub fn record_dedup_duplicate(agent_id: AgentId) {
    let agent_id = agent_id.to_string();
    counter!("dedup.duplicates", "agent_id" => agent_id).increment(1);
}

/// Records how long dispatching one event to its handlers took.
pub fn observe_handle_duration_ms(event_type: &str, agent_id: AgentId, millis: f64) {
    let agent_id = agent_id.to_string();
    histogram!(
        "event.handle.duration_ms",
        "event_type" => event_type.to_owned(),
        "agent_id" => agent_id,
    )
    .record(millis);
}

/// Records how long constructing and routing a published envelope took.
pub fn observe_publish_duration_ms(event_type: &str, agent_id: AgentId, millis: f64) {
    let agent_id = agent_id.to_string();
    histogram!(
        "event.publish.duration_ms",
        "event_type" => event_type.to_owned(),
        "agent_id" => agent_id,
    )
    .record(millis);
}

/// Sets the current count of activated actors in this process.
pub fn set_actors_active(count: usize) {
    gauge!("actors.active").set(count as f64);
}

/// Sets the current backlog length of one agent's stream.
pub fn set_stream_queue_length(agent_id: AgentId, length: usize) {
    let agent_id = agent_id.to_string();
    gauge!("stream.queue.length", "agent_id" => agent_id).set(length as f64);
}

/// Opens the structured log scope every event-handling dispatch runs
/// under, carrying the fields a reader needs to correlate a handler
/// failure back to the event and agent that produced it.
#[must_use]
pub fn event_handling_span(agent_id: AgentId, event_id: &str, event_type: &str, correlation_id: Option<&str>) -> Span {
    info_span!(
        "handle_event",
        agent_id = %agent_id,
        event_id,
        event_type,
        correlation_id,
    )
}
