use std::convert::Infallible;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponseParts, Response, ResponseParts};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Value, json};

use super::{Fields, HeaderReplacements, context_fields};
use crate::error_handling::{HttpError, panic_message, thrown};
use crate::middleware::{Middleware, MiddlewareLayer, middleware_layer};
use crate::utility::tracing_targets::REQUEST_LOG as TRACING_TARGET;

/// Response marker that keeps a request out of the request log and metrics.
///
/// Typically returned by health checks:
///
/// ```rust
/// use trellis_middleware::request_logging::SkipRequestLogging;
///
/// async fn health() -> (SkipRequestLogging, &'static str) {
///     (SkipRequestLogging, "")
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipRequestLogging;

impl IntoResponseParts for SkipRequestLogging {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

/// Sink receiving one record per request.
pub type LogFn = Arc<dyn Fn(&Fields, Option<&HttpError>) + Send + Sync>;

/// Logs every request once its response is known.
///
/// The record holds the [`context_fields`], the request headers after
/// [`HeaderReplacements`], the latency in milliseconds and the final status.
/// When the response was rendered from an [`HttpError`], or the inner chain
/// panicked, the record also holds `err` and `internalErrorString`, and the
/// error is passed to the sink. Panics are logged with status 500 and then
/// resumed.
///
/// Attach early so that rejections from other middleware are logged and the
/// latency covers the whole chain.
#[derive(Clone)]
pub struct RequestLogging {
    log_fn: LogFn,
    header_replacements: Arc<HeaderReplacements>,
}

impl RequestLogging {
    /// Creates request logging with a custom sink.
    ///
    /// Sensitive headers are redacted unless replaced with
    /// [`with_header_replacements`](Self::with_header_replacements).
    pub fn new<F>(log_fn: F) -> Self
    where
        F: Fn(&Fields, Option<&HttpError>) + Send + Sync + 'static,
    {
        Self {
            log_fn: Arc::new(log_fn),
            header_replacements: Arc::new(HeaderReplacements::sensitive()),
        }
    }

    /// Replaces the header substitutions.
    pub fn with_header_replacements(self, header_replacements: HeaderReplacements) -> Self {
        Self {
            header_replacements: Arc::new(header_replacements),
            ..self
        }
    }

    /// Converts into a layer for [`axum::Router::layer`].
    pub fn into_layer(self) -> MiddlewareLayer<Self> {
        middleware_layer(self)
    }

    fn finish(
        &self,
        mut fields: Fields,
        started: Instant,
        status: StatusCode,
        error: Option<&HttpError>,
    ) {
        if let Some(error) = error {
            fields.insert("err".to_owned(), error_fields(error));
            fields.insert("internalErrorString".to_owned(), error.to_string().into());
        }

        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        fields.insert("latency".to_owned(), latency.into());
        fields.insert("status".to_owned(), status.as_u16().into());

        (self.log_fn)(&fields, error);
    }
}

impl Default for RequestLogging {
    /// Logs through `tracing` and redacts sensitive headers.
    fn default() -> Self {
        Self::new(log_with_tracing)
    }
}

impl fmt::Debug for RequestLogging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogging")
            .field("header_replacements", &self.header_replacements)
            .finish_non_exhaustive()
    }
}

impl Middleware for RequestLogging {
    fn call(&self, mut request: Request, next: Next) -> BoxFuture<'static, Response> {
        let logging = self.clone();
        let started = Instant::now();

        let mut fields = Fields::new();
        fields.insert(
            "headers".to_owned(),
            Value::Object(self.header_replacements.apply(request.headers())),
        );
        fields.extend(context_fields(&mut request));

        async move {
            match AssertUnwindSafe(next.run(request)).catch_unwind().await {
                Ok(response) => {
                    if response.extensions().get::<SkipRequestLogging>().is_none() {
                        logging.finish(fields, started, response.status(), thrown(&response));
                    }
                    response
                }
                Err(payload) => {
                    let error = HttpError::internal(panic_message(&*payload));
                    logging.finish(
                        fields,
                        started,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Some(&error),
                    );
                    std::panic::resume_unwind(payload)
                }
            }
        }
        .boxed()
    }
}

fn error_fields(error: &HttpError) -> Value {
    let source = std::error::Error::source(error).map(ToString::to_string);
    json!({
        "message": error.message(),
        "status": error.status().map(|status| status.as_u16()),
        "source": source,
    })
}

/// Default sink: one `tracing` event per request.
fn log_with_tracing(fields: &Fields, error: Option<&HttpError>) {
    let status = fields.get("status").and_then(Value::as_u64).unwrap_or_default();
    let latency = fields.get("latency").and_then(Value::as_u64).unwrap_or_default();
    let record = Value::Object(fields.clone());

    match error {
        Some(error) => tracing::error!(
            target: TRACING_TARGET,
            status,
            latency,
            fields = %record,
            error = %error,
            "request"
        ),
        None => tracing::info!(
            target: TRACING_TARGET,
            status,
            latency,
            fields = %record,
            "request"
        ),
    }
}
