//! Metrics and structured-log scopes for the GAgent runtime: counters for
//! published/handled/dropped events and dedup hits, histograms for handler
//! and publish latency, gauges for live actor and queue depth, and the
//! `{agent_id, event_id, event_type, correlation_id}` log scope every
//! dispatch runs under.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod exporter;
mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use exporter::{install_prometheus_exporter, PrometheusExporterConfig};
pub use metrics::{
    event_handling_span, observe_handle_duration_ms, observe_publish_duration_ms, record_dedup_duplicate,
    record_event_dropped, record_event_handled, record_event_published, record_exception, set_actors_active,
    set_stream_queue_length,
};
