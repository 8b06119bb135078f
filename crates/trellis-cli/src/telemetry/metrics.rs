//! Prometheus exporter for the request metrics.

use std::net::SocketAddr;

use crate::TRACING_TARGET_SERVER_STARTUP;

/// Installs the Prometheus recorder and its scrape endpoint on `addr`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be started.
#[cfg(feature = "prometheus")]
pub(crate) fn install_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    use anyhow::Context;
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install the Prometheus exporter")?;

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %addr,
        "Prometheus exporter listening"
    );
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
pub(crate) fn install_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    tracing::warn!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %addr,
        "Metrics port set but the prometheus feature is disabled, metrics are not exported"
    );
    Ok(())
}
