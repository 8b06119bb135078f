//! Tracing target constants for consistent logging.

/// Tracing target for lazily initialised middleware.
pub const LAZY: &str = "trellis_middleware::lazy";

/// Tracing target for caught request errors.
pub const ERROR_HANDLING: &str = "trellis_middleware::error_handling";

/// Tracing target for panic recovery.
pub const PANIC: &str = "trellis_middleware::error_handling::panic";

/// Tracing target for request metrics.
pub const METRICS: &str = "trellis_middleware::metrics";

/// Tracing target for the default request log sink.
pub const REQUEST_LOG: &str = "trellis_middleware::request_logging";

/// Tracing target for request tracing propagation.
pub const TRACING_HEADERS: &str = "trellis_middleware::tracing_headers";
