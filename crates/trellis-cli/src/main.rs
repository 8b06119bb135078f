#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod handler;
mod server;
mod telemetry;

use std::process;

use anyhow::Context;

use crate::config::Cli;

/// Tracing target for server startup events.
pub const TRACING_TARGET_SERVER_STARTUP: &str = "trellis_cli::server::startup";

/// Tracing target for server shutdown events.
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "trellis_cli::server::shutdown";

/// Tracing target for configuration events.
pub const TRACING_TARGET_CONFIG: &str = "trellis_cli::config";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = format!("{error:#}"),
            "Server exited with an error"
        );
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();
    telemetry::init_tracing()?;

    cli.validate()?;
    cli.log();

    if let Some(addr) = cli.middleware.metrics_addr(cli.server.host) {
        telemetry::install_metrics_exporter(addr)?;
    }

    let router = handler::create_router(&cli.middleware).context("failed to build router")?;
    server::serve(router, cli.server).await?;

    Ok(())
}
