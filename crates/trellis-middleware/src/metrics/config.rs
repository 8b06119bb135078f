#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration for request metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct MetricsConfig {
    /// Fraction of requests to record, in `(0, 1]`.
    #[cfg_attr(
        feature = "config",
        arg(long = "metrics-sample-rate", env = "METRICS_SAMPLE_RATE", default_value = "1.0")
    )]
    pub sample_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { sample_rate: 1.0 }
    }
}

impl MetricsConfig {
    /// Creates a configuration with the given sample rate.
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(Error::config(format!(
                "metrics sample rate must be in (0, 1], got {}",
                self.sample_rate
            )));
        }

        Ok(())
    }
}
