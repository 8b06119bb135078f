//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig          # Host, port, shutdown
//! └── middleware: MiddlewareConfig  # App identity, metrics, lazy TTL, security headers
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! trellis-cli --port 8080 --app-version 42
//!
//! # Or via environment variables
//! PORT=8080 APP_VERSION=42 trellis-cli
//! ```

mod middleware;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
pub use middleware::MiddlewareConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;

use crate::TRACING_TARGET_SERVER_STARTUP;

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "trellis")]
#[command(about = "Demo server for the trellis middleware")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// Middleware configuration (identity, metrics, lazy TTL, headers).
    #[clap(flatten)]
    pub middleware: MiddlewareConfig,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so clap can pick its values up as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.middleware
            .validate()
            .context("invalid middleware configuration")?;
        Ok(())
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();
        self.middleware.log();
    }

    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [
            cfg!(feature = "dotenv").then_some("dotenv"),
            cfg!(feature = "prometheus").then_some("prometheus"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_are_valid() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["trellis"])?;
        cli.validate()?;

        assert_eq!(cli.server.port, 3000);
        assert_eq!(cli.middleware.app_name, "trellis");
        assert_eq!(cli.middleware.lazy.ttl_ms, None);
        assert_eq!(cli.middleware.metrics.sample_rate, 1.0);
        Ok(())
    }

    #[test]
    fn parses_middleware_arguments() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "trellis",
            "--app-version",
            "42",
            "--lazy-ttl-ms",
            "5000",
            "--metrics-sample-rate",
            "0.5",
            "--frame-options",
            "same-origin",
        ])?;
        cli.validate()?;

        assert_eq!(cli.middleware.app().user_agent(), "trellis/42");
        assert_eq!(cli.middleware.lazy.ttl_ms, Some(5000));
        assert_eq!(cli.middleware.metrics.sample_rate, 0.5);
        Ok(())
    }

    #[test]
    fn rejects_invalid_sample_rate() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["trellis", "--metrics-sample-rate", "2"])?;
        assert!(cli.validate().is_err());
        Ok(())
    }
}
