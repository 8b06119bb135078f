use std::collections::BTreeMap;

use metrics::Label;

/// Metric tags keyed by name. Ordered so emitted label sets are stable.
pub type Tags = BTreeMap<String, String>;

/// Sink for distribution metrics, shaped after StatsD's `distribution`.
pub trait MetricsClient: Send + Sync + 'static {
    /// Records `value` under `stat`.
    ///
    /// `sample_rate` in `(0, 1]` is the fraction of calls that should be
    /// recorded; implementations decide whether to sample locally or to
    /// forward the rate to their backend.
    fn distribution(&self, stat: &str, value: f64, sample_rate: f64, tags: &Tags);
}

/// [`MetricsClient`] backed by the [`metrics`] facade.
///
/// Values are recorded as histograms on whichever recorder is installed,
/// e.g. the Prometheus exporter. Sampling happens here since histograms have
/// no notion of a sample rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRsClient;

impl MetricsRsClient {
    /// Creates a client writing to the global recorder.
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl MetricsClient for MetricsRsClient {
    fn distribution(&self, stat: &str, value: f64, sample_rate: f64, tags: &Tags) {
        if sample_rate < 1.0 && fastrand::f64() >= sample_rate {
            return;
        }

        let labels: Vec<Label> = tags
            .iter()
            .map(|(key, value)| Label::new(key.clone(), value.clone()))
            .collect();

        metrics::histogram!(stat.to_owned(), labels).record(value);
    }
}
