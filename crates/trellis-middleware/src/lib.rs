#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod app;
mod error;
mod extensions;
mod middleware;

pub mod error_handling;
pub mod lazy;
pub mod metrics;
pub mod request_logging;
pub mod security;
pub mod tracing_headers;
pub mod utility;
pub mod version;

pub use crate::app::AppIdentifier;
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::extensions::RouterExt;
pub use crate::middleware::{Middleware, MiddlewareLayer, middleware_layer};
