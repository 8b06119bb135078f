//! Per-request latency metrics.

mod client;
mod config;
mod middleware;

pub use client::{MetricsClient, MetricsRsClient, Tags};
pub use config::MetricsConfig;
pub use middleware::{REQUEST_STAT, RequestMetrics, TagsForRequest};
