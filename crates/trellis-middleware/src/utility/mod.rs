//! Shared helpers used across middleware modules.

mod request_summary;
pub mod tracing_targets;

pub use request_summary::RequestSummary;
