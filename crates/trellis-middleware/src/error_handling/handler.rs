use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use futures::future::{BoxFuture, FutureExt};

use super::http_error::{Thrown, prefers_text};
use super::HttpError;
use crate::middleware::{Middleware, MiddlewareLayer, middleware_layer};
use crate::utility::RequestSummary;
use crate::utility::tracing_targets::ERROR_HANDLING as TRACING_TARGET;

/// Callback invoked once for every error caught by [`ErrorHandling`].
pub type OnError = Arc<dyn Fn(&HttpError, &RequestSummary) + Send + Sync>;

/// Normalises responses rendered from an [`HttpError`].
///
/// The status comes from the error (500 when it has none). Server errors are
/// sent with an empty body so internal details never leak; client errors
/// expose their message, or their JSON body when the client does not prefer
/// `text/plain`. The error stays in the response extensions, readable with
/// [`thrown`](super::thrown).
///
/// Place this above any middleware whose output should reflect the final
/// status, below request logging and metrics:
///
/// ```text
/// request logging -> metrics -> error handling -> the rest
/// ```
#[derive(Clone, Default)]
pub struct ErrorHandling {
    on_error: Option<OnError>,
}

impl ErrorHandling {
    /// Creates error handling that only emits `tracing` events.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for caught errors, e.g. to forward them to an
    /// error tracker.
    pub fn on_error<F>(self, on_error: F) -> Self
    where
        F: Fn(&HttpError, &RequestSummary) + Send + Sync + 'static,
    {
        Self {
            on_error: Some(Arc::new(on_error)),
        }
    }

    /// Converts into a layer for [`axum::Router::layer`].
    pub fn into_layer(self) -> MiddlewareLayer<Self> {
        middleware_layer(self)
    }

    fn emit(&self, error: &HttpError, summary: &RequestSummary) {
        let status = error.response_status().as_u16();
        if error.is_server_error() {
            tracing::error!(
                target: TRACING_TARGET,
                status,
                method = %summary.method,
                url = summary.url(),
                error = %error,
                "request failed"
            );
        } else {
            tracing::warn!(
                target: TRACING_TARGET,
                status,
                method = %summary.method,
                url = summary.url(),
                error = %error,
                "request rejected"
            );
        }

        if let Some(on_error) = &self.on_error {
            on_error(error, summary);
        }
    }
}

impl fmt::Debug for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandling")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl Middleware for ErrorHandling {
    fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        let handling = self.clone();
        let summary = RequestSummary::from_request(&request);

        async move {
            let response = next.run(request).await;
            let Some(Thrown(error)) = response.extensions().get::<Thrown>().cloned() else {
                return response;
            };

            handling.emit(&error, &summary);

            let rendered = error.render(prefers_text(&summary.headers));
            let (mut parts, _) = response.into_parts();
            let (rendered_parts, body) = rendered.into_parts();

            parts.status = rendered_parts.status;
            parts.headers.remove(header::CONTENT_TYPE);
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.extend(rendered_parts.headers);

            Response::from_parts(parts, body)
        }
        .boxed()
    }
}
