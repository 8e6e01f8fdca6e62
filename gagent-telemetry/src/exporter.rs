//! Process-wide metrics exporter setup.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TelemetryResult;

/// Where the Prometheus scrape endpoint listens. Constructed once by the
/// runtime bootstrap and installed before any agent is created, since the
/// `metrics` crate's recording macros are no-ops until a recorder is
/// installed.
#[derive(Clone, Debug)]
pub struct PrometheusExporterConfig {
    /// Address the `/metrics` HTTP listener binds to.
    pub listen_addr: SocketAddr,
}

/// Installs a Prometheus exporter as the global metrics recorder.
///
/// # Errors
///
/// Returns [`crate::TelemetryError::ExporterInstall`] if the listener
/// cannot bind or a recorder is already installed.
pub fn install_prometheus_exporter(config: &PrometheusExporterConfig) -> TelemetryResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .install()?;
    Ok(())
}
