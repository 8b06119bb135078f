//! HTTP server startup with graceful shutdown.

mod error;
mod http_server;
mod shutdown;

use axum::Router;
use error::ServerResult;
use http_server::serve_http;

use crate::config::ServerConfig;

/// Starts the HTTP server and runs it until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the address cannot be
/// bound, or the server fails while running.
pub async fn serve(app: Router, config: ServerConfig) -> ServerResult<()> {
    serve_http(app, config).await
}
