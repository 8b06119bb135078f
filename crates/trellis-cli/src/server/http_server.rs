//! HTTP server startup and lifecycle management.

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;

use super::error::{ServerError, ServerResult};
use super::shutdown::{GracefulShutdown, os_signal};
use crate::config::ServerConfig;
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Runs `serve_fn` with startup warnings and shutdown reporting.
pub(crate) async fn serve_with_shutdown<F>(
    server_config: &ServerConfig,
    serve_fn: impl FnOnce() -> F,
) -> ServerResult<()>
where
    F: Future<Output = io::Result<()>>,
{
    let start_time = Instant::now();

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %server_config.server_addr(),
        "Server is ready and listening for connections"
    );

    if server_config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            "Server is bound to all interfaces. Ensure firewall rules are properly configured."
        );
    }

    let uptime_secs = || start_time.elapsed().as_secs();

    if let Err(err) = serve_fn().await {
        let error = ServerError::Runtime(err);
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            error_code = error.error_code(),
            suggestion = error.suggestion(),
            recoverable = error.is_recoverable(),
            uptime_secs = uptime_secs(),
            "Server encountered an error"
        );
        return Err(error);
    }

    tracing::info!(
        target: TRACING_TARGET_SERVER_SHUTDOWN,
        uptime_secs = uptime_secs(),
        "Server shut down gracefully"
    );
    Ok(())
}

/// Starts an HTTP server with graceful shutdown.
///
/// Once a shutdown signal arrives, in-flight requests get up to the configured
/// shutdown timeout to finish; remaining connections are dropped afterwards.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the address cannot be
/// bound, or the server fails while running.
pub async fn serve_http(app: Router, server_config: ServerConfig) -> ServerResult<()> {
    if let Err(validation_error) = server_config.validate() {
        tracing::error!(
            target: TRACING_TARGET_SERVER_STARTUP,
            error = %validation_error,
            "Invalid server configuration"
        );

        return Err(ServerError::invalid_config(&validation_error));
    }

    let server_addr = server_config.server_addr();
    let listener = TcpListener::bind(server_addr).await.map_err(|listener_err| {
        tracing::error!(
            target: TRACING_TARGET_SERVER_STARTUP,
            addr = %server_addr,
            error = %listener_err,
            "Failed to bind to address"
        );

        ServerError::bind_error(&server_addr.to_string(), listener_err)
    })?;

    let GracefulShutdown { trigger, deadline } =
        GracefulShutdown::new(os_signal(), server_config.shutdown_timeout());

    serve_with_shutdown(&server_config, || async move {
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(trigger)
        .into_future();

        tokio::select! {
            result = server => result,
            () = deadline => Ok(()),
        }
    })
    .await
}
