//! Middleware whose construction is deferred to the first request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::future::{BoxFuture, FutureExt};
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use super::cache::InitCache;
use super::clock::{Clock, MonotonicClock};
use crate::middleware::{Middleware, MiddlewareLayer, middleware_layer};

/// Configuration for lazily initialised middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct LazyConfig {
    /// Milliseconds a successfully initialised middleware stays cached.
    /// Unset means it is kept for the lifetime of the process.
    #[cfg_attr(feature = "config", arg(long = "lazy-ttl-ms", env = "LAZY_TTL_MS"))]
    pub ttl_ms: Option<u64>,
}

impl LazyConfig {
    /// Returns the configured TTL as a [`Duration`].
    #[inline]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

/// Defers building a middleware until a request needs it.
///
/// Every request goes through the shared [`InitCache`]: the first request
/// (and every request after a failed attempt, or after the TTL elapsed)
/// runs the factory, concurrent requests wait on that same attempt, and the
/// rest reuse the cached middleware. Initialisation errors are rendered with
/// their own [`IntoResponse`] implementation and are never cached.
///
/// A response produced by the resolved middleware, error status or not, is
/// passed through unchanged and does not invalidate the cache.
pub struct LazyMiddleware<M, E, C = MonotonicClock> {
    cache: Arc<InitCache<M, E, C>>,
}

impl<M, E> LazyMiddleware<M, E, MonotonicClock>
where
    M: Middleware,
    E: Clone + IntoResponse + Send + Sync + 'static,
{
    /// Wraps `init`; the middleware is kept until the process exits or an
    /// explicit [`InitCache::invalidate`].
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M, E>> + Send + 'static,
    {
        Self::from_cache(InitCache::new(init))
    }

    /// Wraps `init` using the TTL from `config`.
    pub fn with_config<F, Fut>(init: F, config: &LazyConfig) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M, E>> + Send + 'static,
    {
        Self::from_cache(InitCache::new(init).with_ttl(config.ttl()))
    }
}

impl<M, E, C> LazyMiddleware<M, E, C>
where
    M: Middleware,
    E: Clone + IntoResponse + Send + Sync + 'static,
    C: Clock,
{
    /// Uses an already configured cache.
    pub fn from_cache(cache: InitCache<M, E, C>) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Returns the underlying cache.
    #[inline]
    pub fn cache(&self) -> &InitCache<M, E, C> {
        &self.cache
    }

    /// Converts into a layer for [`axum::Router::layer`].
    pub fn into_layer(self) -> MiddlewareLayer<Self> {
        middleware_layer(self)
    }
}

impl<M, E, C> Clone for LazyMiddleware<M, E, C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<M, E, C> std::fmt::Debug for LazyMiddleware<M, E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyMiddleware")
            .field("cache", &self.cache)
            .finish()
    }
}

impl<M, E, C> Middleware for LazyMiddleware<M, E, C>
where
    M: Middleware,
    E: Clone + IntoResponse + Send + Sync + 'static,
    C: Clock,
{
    fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        let cache = Arc::clone(&self.cache);
        async move {
            match cache.get().await {
                Ok(middleware) => middleware.call(request, next).await,
                Err(error) => error.into_response(),
            }
        }
        .boxed()
    }
}
