//! Telemetry setup errors.

use thiserror::Error;

/// Errors raised while installing the metrics exporter.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The Prometheus exporter failed to bind or install itself.
    #[error("failed to install prometheus exporter: {0}")]
    ExporterInstall(#[from] metrics_exporter_prometheus::BuildError),
}

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
