//! Extension trait for `axum::Router` to apply the middleware of this crate.

use axum::Router;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error_handling::{ErrorHandling, catch_panic};
use crate::lazy::{Clock, LazyMiddleware};
use crate::metrics::RequestMetrics;
use crate::middleware::{Middleware, middleware_layer};
use crate::request_logging::RequestLogging;
use crate::security::SecureHeaders;
use crate::tracing_headers::tracing_middleware;
use crate::version::VersionHeaders;

/// Extension trait for `axum::`[`Router`] for layering middleware.
///
/// Layers added later wrap the ones added earlier, so call these methods
/// from the innermost to the outermost middleware:
///
/// ```rust,no_run
/// use axum::Router;
/// use trellis_middleware::{AppIdentifier, RouterExt};
/// use trellis_middleware::metrics::{MetricsRsClient, RequestMetrics};
/// use trellis_middleware::request_logging::RequestLogging;
/// use trellis_middleware::version::VersionHeaders;
///
/// # fn main() -> trellis_middleware::Result<()> {
/// let version = VersionHeaders::new(&AppIdentifier::new("my-app").with_version("1"))?;
/// let router: Router = Router::new()
///     .with_version(&version)
///     .with_default_secure_headers()
///     .with_tracing_headers()
///     .with_default_error_handling()
///     .with_metrics(RequestMetrics::new(MetricsRsClient::new()))
///     .with_request_logging(RequestLogging::default());
/// # Ok(())
/// # }
/// ```
pub trait RouterExt<S> {
    /// Layers [`ErrorHandling`] over a [`CatchPanic`] layer, so handler
    /// panics are rendered as internal server errors.
    ///
    /// [`CatchPanic`]: tower_http::catch_panic::CatchPanicLayer
    fn with_error_handling(self, handling: ErrorHandling) -> Self;

    /// Layers error handling that only reports through `tracing`.
    fn with_default_error_handling(self) -> Self;

    /// Layers [`RequestMetrics`].
    fn with_metrics(self, metrics: RequestMetrics) -> Self;

    /// Layers [`RequestLogging`].
    fn with_request_logging(self, logging: RequestLogging) -> Self;

    /// Layers one [`SetResponseHeader`] per security header.
    ///
    /// [`SetResponseHeader`]: tower_http::set_header::SetResponseHeaderLayer
    fn with_secure_headers(self, headers: &SecureHeaders) -> Self;

    /// Layers the default security headers.
    fn with_default_secure_headers(self) -> Self;

    /// Layers [`tracing_middleware`].
    fn with_tracing_headers(self) -> Self;

    /// Layers the `Server` and `X-Api-Version` response headers.
    fn with_version(self, version: &VersionHeaders) -> Self;

    /// Layers any [`Middleware`].
    fn with_middleware<M>(self, middleware: M) -> Self
    where
        M: Middleware + Clone;

    /// Layers a [`LazyMiddleware`].
    fn with_lazy_middleware<M, E, C>(self, lazy: LazyMiddleware<M, E, C>) -> Self
    where
        M: Middleware,
        E: Clone + IntoResponse + Send + Sync + 'static,
        C: Clock;
}

impl<S> RouterExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_error_handling(self, handling: ErrorHandling) -> Self {
        let middlewares = ServiceBuilder::new()
            .layer(handling.into_layer())
            .layer(CatchPanicLayer::custom(catch_panic));

        self.layer(middlewares)
    }

    fn with_default_error_handling(self) -> Self {
        self.with_error_handling(ErrorHandling::default())
    }

    fn with_metrics(self, metrics: RequestMetrics) -> Self {
        self.layer(metrics.into_layer())
    }

    fn with_request_logging(self, logging: RequestLogging) -> Self {
        self.layer(logging.into_layer())
    }

    fn with_secure_headers(self, headers: &SecureHeaders) -> Self {
        headers
            .headers()
            .iter()
            .fold(self, |router, (name, value)| {
                router.layer(SetResponseHeaderLayer::if_not_present(
                    name.clone(),
                    value.clone(),
                ))
            })
    }

    fn with_default_secure_headers(self) -> Self {
        self.with_secure_headers(&SecureHeaders::default())
    }

    fn with_tracing_headers(self) -> Self {
        self.layer(from_fn(tracing_middleware))
    }

    fn with_version(self, version: &VersionHeaders) -> Self {
        version
            .headers()
            .into_iter()
            .fold(self, |router, (name, value)| {
                router.layer(SetResponseHeaderLayer::if_not_present(name, value))
            })
    }

    fn with_middleware<M>(self, middleware: M) -> Self
    where
        M: Middleware + Clone,
    {
        self.layer(middleware_layer(middleware))
    }

    fn with_lazy_middleware<M, E, C>(self, lazy: LazyMiddleware<M, E, C>) -> Self
    where
        M: Middleware,
        E: Clone + IntoResponse + Send + Sync + 'static,
        C: Clock,
    {
        self.layer(lazy.into_layer())
    }
}
