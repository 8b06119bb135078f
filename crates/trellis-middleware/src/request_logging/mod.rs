//! Request logging with header redaction.

mod fields;
mod headers;
mod middleware;

pub use fields::{Fields, context_fields};
pub use headers::{HeaderReplacements, REDACTED_HEADER, SENSITIVE_HEADERS};
pub use middleware::{LogFn, RequestLogging, SkipRequestLogging};
