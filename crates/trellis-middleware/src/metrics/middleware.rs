use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use futures::future::{BoxFuture, FutureExt};

use super::{MetricsClient, MetricsConfig, Tags};
use crate::middleware::{Middleware, MiddlewareLayer, middleware_layer};
use crate::request_logging::SkipRequestLogging;
use crate::utility::RequestSummary;
use crate::utility::tracing_targets::METRICS as TRACING_TARGET;

/// Name of the per-request latency distribution.
pub const REQUEST_STAT: &str = "request.distribution";

/// Callback returning extra tags for a finished request.
///
/// The response is `None` when the inner chain panicked.
pub type TagsForRequest = Arc<dyn Fn(&RequestSummary, Option<&Response>) -> Tags + Send + Sync>;

/// Records a latency distribution for every request.
///
/// Each sample carries `http_status`, `http_status_family` (`2xx`, `4xx`, …)
/// and the lower-cased `http_method`, merged with whatever the tag callback
/// returns; callback tags take precedence. Requests whose response carries
/// [`SkipRequestLogging`] are not recorded. A panic further down is recorded
/// as a 500 and then resumed.
///
/// Attach early so that rejections from other middleware are counted and
/// the latency covers the whole chain.
#[derive(Clone)]
pub struct RequestMetrics {
    client: Arc<dyn MetricsClient>,
    tags_for_request: Option<TagsForRequest>,
    sample_rate: f64,
}

impl RequestMetrics {
    /// Creates request metrics recording every request to `client`.
    pub fn new(client: impl MetricsClient) -> Self {
        Self {
            client: Arc::new(client),
            tags_for_request: None,
            sample_rate: 1.0,
        }
    }

    /// Creates request metrics using the settings from `config`.
    pub fn with_config(client: impl MetricsClient, config: &MetricsConfig) -> Self {
        Self::new(client).with_sample_rate(config.sample_rate)
    }

    /// Adds tags computed from the request and response, typically the
    /// matched route.
    pub fn with_tags<F>(self, tags_for_request: F) -> Self
    where
        F: Fn(&RequestSummary, Option<&Response>) -> Tags + Send + Sync + 'static,
    {
        Self {
            tags_for_request: Some(Arc::new(tags_for_request)),
            ..self
        }
    }

    /// Sets the sample rate forwarded to the client.
    pub fn with_sample_rate(self, sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }

    /// Converts into a layer for [`axum::Router::layer`].
    pub fn into_layer(self) -> MiddlewareLayer<Self> {
        middleware_layer(self)
    }

    fn record(
        &self,
        summary: &RequestSummary,
        response: Option<&Response>,
        status: StatusCode,
        latency: Duration,
    ) {
        let mut tags = Tags::from([
            ("http_status".to_owned(), status.as_u16().to_string()),
            (
                "http_status_family".to_owned(),
                format!("{}xx", status.as_u16() / 100),
            ),
            (
                "http_method".to_owned(),
                summary.method.as_str().to_lowercase(),
            ),
        ]);

        if let Some(tags_for_request) = &self.tags_for_request {
            tags.extend(tags_for_request(summary, response));
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        tracing::trace!(
            target: TRACING_TARGET,
            status = status.as_u16(),
            latency_ms,
            "recording request metrics"
        );

        self.client
            .distribution(REQUEST_STAT, latency_ms, self.sample_rate, &tags);
    }
}

impl fmt::Debug for RequestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMetrics")
            .field("sample_rate", &self.sample_rate)
            .field("tags_for_request", &self.tags_for_request.is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for RequestMetrics {
    fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        let metrics = self.clone();
        let summary = RequestSummary::from_request(&request);

        async move {
            let started = Instant::now();
            match AssertUnwindSafe(next.run(request)).catch_unwind().await {
                Ok(response) => {
                    if response.extensions().get::<SkipRequestLogging>().is_none() {
                        metrics.record(
                            &summary,
                            Some(&response),
                            response.status(),
                            started.elapsed(),
                        );
                    }
                    response
                }
                Err(payload) => {
                    metrics.record(
                        &summary,
                        None,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        started.elapsed(),
                    );
                    std::panic::resume_unwind(payload)
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::Router;
    use axum::routing::{get, post};
    use axum_test::TestServer;
    use tower_http::catch_panic::CatchPanicLayer;

    use super::*;
    use crate::error_handling::HttpError;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        stat: String,
        value: f64,
        sample_rate: f64,
        tags: Tags,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Sample>>>);

    impl Recorder {
        fn samples(&self) -> Vec<Sample> {
            self.0.lock().unwrap().clone()
        }
    }

    impl MetricsClient for Recorder {
        fn distribution(&self, stat: &str, value: f64, sample_rate: f64, tags: &Tags) {
            self.0.lock().unwrap().push(Sample {
                stat: stat.to_owned(),
                value,
                sample_rate,
                tags: tags.clone(),
            });
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    fn app(metrics: RequestMetrics) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/teapot",
                post(|| async { HttpError::from(StatusCode::IM_A_TEAPOT) }),
            )
            .route(
                "/health",
                get(|| async { (SkipRequestLogging, "healthy") }),
            )
            .route("/explode", get(explode))
            .layer(metrics.into_layer())
            .layer(CatchPanicLayer::new())
    }

    #[tokio::test]
    async fn test_records_request_distribution() -> anyhow::Result<()> {
        let recorder = Recorder::default();
        let server = TestServer::new(app(RequestMetrics::new(recorder.clone())))?;

        server.get("/").await.assert_status_ok();

        let samples = recorder.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].stat, "request.distribution");
        assert_eq!(samples[0].sample_rate, 1.0);
        assert!(samples[0].value >= 0.0);
        assert_eq!(
            samples[0].tags,
            tags(&[
                ("http_method", "get"),
                ("http_status", "200"),
                ("http_status_family", "2xx"),
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_tags_take_precedence() -> anyhow::Result<()> {
        let recorder = Recorder::default();
        let metrics = RequestMetrics::with_config(
            recorder.clone(),
            &MetricsConfig::with_sample_rate(0.5),
        )
        .with_tags(|summary, _| {
            let mut tags = Tags::new();
            if let Some(route) = &summary.route {
                tags.insert("route".to_owned(), route.clone());
            }
            tags.insert("http_method".to_owned(), "custom".to_owned());
            tags
        });

        let server = TestServer::new(app(metrics))?;
        server.post("/teapot").expect_failure().await;

        let samples = recorder.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].sample_rate, 0.5);
        assert_eq!(
            samples[0].tags,
            tags(&[
                ("http_method", "custom"),
                ("http_status", "418"),
                ("http_status_family", "4xx"),
                ("route", "/teapot"),
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_skips_requests_marked_for_skipping() -> anyhow::Result<()> {
        let recorder = Recorder::default();
        let server = TestServer::new(app(RequestMetrics::new(recorder.clone())))?;

        server.get("/health").await.assert_status_ok();
        assert!(recorder.samples().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_records_panic_as_server_error() -> anyhow::Result<()> {
        let recorder = Recorder::default();
        let server = TestServer::new(app(RequestMetrics::new(recorder.clone())))?;

        let response = server.get("/explode").expect_failure().await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let samples = recorder.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tags["http_status"], "500");
        assert_eq!(samples[0].tags["http_status_family"], "5xx");
        Ok(())
    }
}
