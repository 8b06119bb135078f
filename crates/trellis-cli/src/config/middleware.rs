//! Middleware configuration for the HTTP server.
//!
//! The metrics, lazy initialisation and security header settings come from
//! `trellis-middleware` with its `config` feature enabled.
//!
//! # Example
//!
//! ```bash
//! trellis-cli --app-version 42 --metrics-sample-rate 0.1 --frame-options same-origin
//! ```

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};
use trellis_middleware::AppIdentifier;
use trellis_middleware::lazy::LazyConfig;
use trellis_middleware::metrics::MetricsConfig;
use trellis_middleware::security::{SecureHeaders, SecureHeadersConfig};

use crate::TRACING_TARGET_CONFIG;

/// Middleware configuration combining identity, metrics, lazy initialisation
/// and security header settings.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Application name, sent as the `Server` header and in outgoing `User-Agent`s.
    #[arg(long, env = "APP_NAME", default_value = "trellis")]
    pub app_name: String,

    /// Application version, typically a CI build number.
    #[arg(long, env = "APP_VERSION")]
    pub app_version: Option<String>,

    /// Port for the Prometheus scrape endpoint. Unset disables the exporter.
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Request metrics configuration.
    #[clap(flatten)]
    pub metrics: MetricsConfig,

    /// Lazy middleware configuration.
    #[clap(flatten)]
    pub lazy: LazyConfig,

    /// Security headers configuration.
    #[clap(flatten)]
    pub secure_headers: SecureHeadersConfig,
}

impl MiddlewareConfig {
    /// Returns the identity of the running application.
    pub fn app(&self) -> AppIdentifier {
        let app = AppIdentifier::new(self.app_name.clone());
        match &self.app_version {
            Some(version) => app.with_version(version.clone()),
            None => app,
        }
    }

    /// Returns the address of the Prometheus endpoint, if enabled.
    pub fn metrics_addr(&self, host: IpAddr) -> Option<SocketAddr> {
        self.metrics_port.map(|port| SocketAddr::new(host, port))
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_name.trim().is_empty() {
            anyhow::bail!("application name must not be empty");
        }

        self.metrics
            .validate()
            .context("invalid metrics configuration")?;
        SecureHeaders::try_from(&self.secure_headers)
            .context("invalid security headers configuration")?;
        Ok(())
    }

    /// Logs middleware configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            app = %self.app(),
            "Application identity"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            sample_rate = self.metrics.sample_rate,
            metrics_port = ?self.metrics_port,
            "Metrics configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            ttl_ms = ?self.lazy.ttl_ms,
            "Lazy middleware configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            hsts = %self.secure_headers.hsts_header_value(),
            csp = ?self.secure_headers.csp_header_value(),
            frame_options = self.secure_headers.frame_options.as_str(),
            "Security headers configuration"
        );
    }
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            app_name: "trellis".to_owned(),
            app_version: None,
            metrics_port: None,
            metrics: MetricsConfig::default(),
            lazy: LazyConfig::default(),
            secure_headers: SecureHeadersConfig::default(),
        }
    }
}
