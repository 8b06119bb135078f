//! Lazily initialised middleware.
//!
//! [`LazyMiddleware`] takes an asynchronous factory and builds the actual
//! middleware on the first request that needs it. Construction failures are
//! returned to that request and forgotten, so the next request tries again.
//! An optional TTL forces periodic re-initialisation, which is useful for
//! middleware that wraps credentials or remote configuration.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use axum::Router;
//! use axum::extract::Request;
//! use axum::http::StatusCode;
//! use axum::middleware::Next;
//! use axum::response::Response;
//! use trellis_middleware::lazy::{InitCache, LazyMiddleware};
//!
//! async fn passthrough(request: Request, next: Next) -> Response {
//!     next.run(request).await
//! }
//!
//! let cache = InitCache::new(|| async { Ok::<_, StatusCode>(passthrough) })
//!     .with_ttl(Duration::from_secs(300));
//! let router: Router = Router::new().layer(LazyMiddleware::from_cache(cache).into_layer());
//! ```

mod cache;
mod clock;
mod lazy_middleware;

pub use cache::InitCache;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use lazy_middleware::{LazyConfig, LazyMiddleware};
