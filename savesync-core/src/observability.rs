/*!
Observability infrastructure for SaveSync.

This module provides:
- Structured logging setup through `tracing-subscriber`
- Prometheus metrics for remote requests and save sizes (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SyncError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<SyncMetrics> = OnceLock::new();

/// Metrics collection for SaveSync operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SyncMetrics {
    pub remote_requests_total: Counter,
    pub remote_errors_total: Counter,
    pub remote_latency_seconds: Histogram,
    pub save_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> SyncError {
    SyncError::validation(format!("Failed to set up metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
impl SyncMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let remote_requests_total = Counter::new(
            "savesync_remote_requests_total",
            "Total remote save requests issued",
        )
        .map_err(|e| metric_error("remote_requests_total", e))?;

        let remote_errors_total = Counter::new(
            "savesync_remote_errors_total",
            "Total remote save requests that failed",
        )
        .map_err(|e| metric_error("remote_errors_total", e))?;

        let remote_latency_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "savesync_remote_latency_seconds",
            "Duration of remote save requests in seconds",
        ))
        .map_err(|e| metric_error("remote_latency_seconds", e))?;

        let save_size_bytes = Histogram::with_opts(
            prometheus::HistogramOpts::new("savesync_save_size_bytes", "Size of exported saves")
                .buckets(prometheus::exponential_buckets(512.0, 2.0, 10).map_err(|e| {
                    metric_error("save_size_bytes", e)
                })?),
        )
        .map_err(|e| metric_error("save_size_bytes", e))?;

        registry
            .register(Box::new(remote_requests_total.clone()))
            .map_err(|e| metric_error("remote_requests_total", e))?;
        registry
            .register(Box::new(remote_errors_total.clone()))
            .map_err(|e| metric_error("remote_errors_total", e))?;
        registry
            .register(Box::new(remote_latency_seconds.clone()))
            .map_err(|e| metric_error("remote_latency_seconds", e))?;
        registry
            .register(Box::new(save_size_bytes.clone()))
            .map_err(|e| metric_error("save_size_bytes", e))?;

        Ok(Self {
            remote_requests_total,
            remote_errors_total,
            remote_latency_seconds,
            save_size_bytes,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static SyncMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize SaveSync metrics"))
    }

    pub fn record_save_size(&self, size_bytes: usize) {
        self.save_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SyncError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SyncError::validation(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Measures one remote request
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
    operation: &'static str,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    /// Count a request and start timing it
    pub fn start(operation: &'static str) -> Self {
        SyncMetrics::global().remote_requests_total.inc();
        Self {
            start: Instant::now(),
            operation,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn finish(self) {
        SyncMetrics::global()
            .remote_latency_seconds
            .observe(self.start.elapsed().as_secs_f64());
    }

    pub fn finish_with_error(self) {
        let metrics = SyncMetrics::global();
        metrics
            .remote_latency_seconds
            .observe(self.start.elapsed().as_secs_f64());
        metrics.remote_errors_total.inc();
    }
}

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `json` - Emit JSON lines instead of human-readable output
///
/// The filter comes from `RUST_LOG`, with `savesync=info` added by default.
pub fn init_observability(json: bool) -> Result<()> {
    init_observability_with_level(json, "info")
}

/// Initialize the global tracing subscriber with `savesync=<level>` added
/// to the `RUST_LOG` filter
pub fn init_observability_with_level(json: bool, level: &str) -> Result<()> {
    #[cfg(feature = "metrics")]
    SyncMetrics::global();

    let filter = EnvFilter::from_default_env().add_directive(
        format!("savesync={level}")
            .parse()
            .map_err(|e| SyncError::validation(format!("Invalid log directive: {e}")))?,
    );

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        set_global_default(subscriber)
    };

    result.map_err(|e| {
        SyncError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("SaveSync observability initialized");
    Ok(())
}

/// Initialize observability with human-readable output
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_observability_installs_once() {
        assert!(init_observability(true).is_ok());
        assert!(init_default_observability().is_err());
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_timer() {
        let timer = MetricsTimer::start("create");
        assert_eq!(timer.operation(), "create");
        timer.finish();

        MetricsTimer::start("fetch").finish_with_error();
        SyncMetrics::global().record_save_size(131_072);

        let text = SyncMetrics::global().gather_metrics().unwrap();
        assert!(text.contains("savesync_remote_requests_total"));
        assert!(text.contains("savesync_remote_errors_total"));
        assert!(text.contains("savesync_save_size_bytes"));
    }
}
