//! Demo routes and the middleware stack around them.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value, json};
use trellis_middleware::error_handling::{ErrorHandling, HttpError};
use trellis_middleware::lazy::LazyMiddleware;
use trellis_middleware::metrics::{MetricsRsClient, RequestMetrics};
use trellis_middleware::request_logging::{RequestLogging, SkipRequestLogging};
use trellis_middleware::security::SecureHeaders;
use trellis_middleware::tracing_headers::{RequestTracing, outgoing_headers};
use trellis_middleware::version::VersionHeaders;
use trellis_middleware::{AppIdentifier, Middleware, RouterExt};

use crate::TRACING_TARGET_SERVER_STARTUP;
use crate::config::MiddlewareConfig;

/// Header stamped by the lazily built middleware.
const INITIALIZED_AT_HEADER: HeaderName = HeaderName::from_static("x-initialized-at");

/// Creates the router with every middleware applied.
///
/// Layers are listed innermost first, so a request passes through request
/// logging, metrics, error handling, tracing headers, security headers,
/// version headers and the lazy middleware, in that order.
pub fn create_router(config: &MiddlewareConfig) -> anyhow::Result<Router> {
    let app = config.app();
    let version = VersionHeaders::new(&app)?;
    let secure_headers = SecureHeaders::try_from(&config.secure_headers)?;
    let metrics = RequestMetrics::with_config(MetricsRsClient::new(), &config.metrics);
    let lazy = LazyMiddleware::with_config(InitializedAt::build, &config.lazy);

    let router = routes()
        .with_state(app)
        .with_lazy_middleware(lazy)
        .with_version(&version)
        .with_secure_headers(&secure_headers)
        .with_tracing_headers()
        .with_error_handling(ErrorHandling::default())
        .with_metrics(metrics)
        .with_request_logging(RequestLogging::default());

    Ok(router)
}

fn routes() -> Router<AppIdentifier> {
    Router::new()
        .route("/", get(index))
        .route("/request", get(describe_request))
        .route("/teapot", get(teapot))
        .route("/invalid", get(invalid))
        .route("/failure", get(failure))
        .route("/panic", get(explode))
        .route("/health", get(health))
}

async fn index() -> &'static str {
    "Hello from trellis"
}

/// Returns the tracing identifiers of the request and the headers a call to
/// another service would carry.
async fn describe_request(
    State(app): State<AppIdentifier>,
    tracing: RequestTracing,
) -> Result<Json<Value>, HttpError> {
    let headers = outgoing_headers(&app, &tracing)
        .map_err(|error| HttpError::internal("cannot build outgoing headers").with_source(error))?;

    let outgoing: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), value.into()))
        })
        .collect();

    Ok(Json(json!({
        "tracing": tracing,
        "outgoing": outgoing,
    })))
}

async fn teapot() -> HttpError {
    HttpError::from_status(StatusCode::IM_A_TEAPOT)
}

async fn invalid() -> HttpError {
    HttpError::json(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input",
        json!({ "errors": [{ "path": "name", "message": "required" }] }),
    )
}

async fn failure() -> HttpError {
    HttpError::internal("upstream dependency unavailable")
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

async fn health() -> impl IntoResponse {
    (SkipRequestLogging, "ok")
}

/// Stamps every response with the time it was built at.
///
/// Built lazily on the first request, and again once the configured TTL
/// elapses.
#[derive(Debug, Clone)]
struct InitializedAt {
    value: HeaderValue,
}

impl InitializedAt {
    async fn build() -> Result<Self, HttpError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|error| HttpError::internal("system clock is before the epoch").with_source(error))?
            .as_millis();

        tracing::info!(
            target: TRACING_TARGET_SERVER_STARTUP,
            initialized_at = %millis,
            "Lazy middleware initialized"
        );

        Ok(Self {
            value: HeaderValue::from_str(&millis.to_string())
                .map_err(|error| HttpError::internal("invalid timestamp").with_source(error))?,
        })
    }
}

impl Middleware for InitializedAt {
    fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        let value = self.value.clone();
        async move {
            let mut response = next.run(request).await;
            response.headers_mut().insert(INITIALIZED_AT_HEADER, value);
            response
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header;
    use axum_test::TestServer;

    use super::*;

    fn server(config: &MiddlewareConfig) -> anyhow::Result<TestServer> {
        Ok(TestServer::new(create_router(config)?)?)
    }

    #[tokio::test]
    async fn index_carries_every_header() -> anyhow::Result<()> {
        let server = server(&MiddlewareConfig::default())?;

        let response = server.get("/").await;
        response.assert_status_ok();
        response.assert_text("Hello from trellis");

        assert_eq!(response.header(header::SERVER), "trellis");
        assert_eq!(response.header(header::X_CONTENT_TYPE_OPTIONS), "nosniff");
        assert_eq!(response.header(header::X_FRAME_OPTIONS), "deny");
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key(INITIALIZED_AT_HEADER));
        Ok(())
    }

    #[tokio::test]
    async fn lazy_middleware_is_built_once() -> anyhow::Result<()> {
        let server = server(&MiddlewareConfig::default())?;

        let first = server.get("/").await.header(INITIALIZED_AT_HEADER);
        let second = server.get("/health").await.header(INITIALIZED_AT_HEADER);
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn request_tracing_is_described() -> anyhow::Result<()> {
        let config = MiddlewareConfig {
            app_version: Some("42".to_owned()),
            ..MiddlewareConfig::default()
        };
        let server = server(&config)?;

        let response = server
            .get("/request")
            .add_header(
                HeaderName::from_static("x-request-id"),
                HeaderValue::from_static("abc-123"),
            )
            .add_header(
                HeaderName::from_static("x-session-id"),
                HeaderValue::from_static("session-1"),
            )
            .await;

        response.assert_status_ok();
        assert_eq!(response.header("x-api-version"), "42");

        let body: Value = response.json();
        assert_eq!(body["tracing"]["request_id"], "abc-123");
        assert_eq!(body["outgoing"]["user-agent"], "trellis/42");
        assert_eq!(body["outgoing"]["x-request-id"], "abc-123");
        assert_eq!(body["outgoing"]["x-session-id"], "session-1");
        Ok(())
    }

    #[tokio::test]
    async fn client_errors_expose_their_message() -> anyhow::Result<()> {
        let server = server(&MiddlewareConfig::default())?;

        let response = server.get("/teapot").expect_failure().await;
        response.assert_status(StatusCode::IM_A_TEAPOT);
        response.assert_text("I'm a teapot");

        let response = server.get("/invalid").expect_failure().await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["errors"][0]["path"], "name");

        let response = server
            .get("/invalid")
            .add_header(header::ACCEPT, HeaderValue::from_static("text/plain"))
            .expect_failure()
            .await;
        response.assert_text("Invalid input");
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_are_redacted() -> anyhow::Result<()> {
        let server = server(&MiddlewareConfig::default())?;

        for path in ["/failure", "/panic"] {
            let response = server.get(path).expect_failure().await;
            response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            response.assert_text("");
        }
        Ok(())
    }

    #[tokio::test]
    async fn health_check_succeeds() -> anyhow::Result<()> {
        let server = server(&MiddlewareConfig::default())?;
        server.get("/health").await.assert_text("ok");
        Ok(())
    }
}
