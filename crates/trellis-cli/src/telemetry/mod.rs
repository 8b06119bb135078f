//! Telemetry: tracing subscriber and metrics exporter.

mod metrics;
mod tracing;

pub(crate) use self::metrics::install_metrics_exporter;
pub(crate) use self::tracing::init_tracing;
