/*!
Observability infrastructure for Savekeep.

- Structured logging setup on top of `tracing-subscriber`
- Prometheus metrics for save and load operations (feature `metrics`)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SaveError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<SaveMetrics>> = OnceLock::new();

/// Operations tracked by the metrics
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Save,
    Load,
}

/// Metrics collection for engine operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SaveMetrics {
    pub saves_total: Counter,
    pub loads_total: Counter,
    pub failures_total: Counter,
    pub payload_size_bytes: Histogram,
    pub operation_seconds: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> SaveError {
    SaveError::storage(format!("Failed to set up metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
impl SaveMetrics {
    /// Initialize new metrics instance
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = Counter::new("savekeep_saves_total", "Total save operations")
            .map_err(|e| metric_error("savekeep_saves_total", e))?;
        let loads_total = Counter::new("savekeep_loads_total", "Total load operations")
            .map_err(|e| metric_error("savekeep_loads_total", e))?;
        let failures_total = Counter::new(
            "savekeep_failures_total",
            "Total save and load operations that failed",
        )
        .map_err(|e| metric_error("savekeep_failures_total", e))?;

        let payload_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "savekeep_payload_size_bytes",
                "Size of stored payloads in bytes",
            )
            .buckets(prometheus::exponential_buckets(64.0, 4.0, 10).map_err(|e| {
                metric_error("savekeep_payload_size_bytes", e)
            })?),
        )
        .map_err(|e| metric_error("savekeep_payload_size_bytes", e))?;

        let operation_seconds = Histogram::with_opts(HistogramOpts::new(
            "savekeep_operation_seconds",
            "Duration of save and load operations in seconds",
        ))
        .map_err(|e| metric_error("savekeep_operation_seconds", e))?;

        registry
            .register(Box::new(saves_total.clone()))
            .map_err(|e| metric_error("savekeep_saves_total", e))?;
        registry
            .register(Box::new(loads_total.clone()))
            .map_err(|e| metric_error("savekeep_loads_total", e))?;
        registry
            .register(Box::new(failures_total.clone()))
            .map_err(|e| metric_error("savekeep_failures_total", e))?;
        registry
            .register(Box::new(payload_size_bytes.clone()))
            .map_err(|e| metric_error("savekeep_payload_size_bytes", e))?;
        registry
            .register(Box::new(operation_seconds.clone()))
            .map_err(|e| metric_error("savekeep_operation_seconds", e))?;

        Ok(Self {
            saves_total,
            loads_total,
            failures_total,
            payload_size_bytes,
            operation_seconds,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    ///
    /// Returns `None` if the registry could not be built; the failure is
    /// logged once.
    pub fn global() -> Option<&'static SaveMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::error!("Failed to initialize Savekeep metrics: {e}");
                    None
                }
            })
            .as_ref()
    }

    pub fn record_operation(&self, operation: Operation) {
        match operation {
            Operation::Save => self.saves_total.inc(),
            Operation::Load => self.loads_total.inc(),
        }
    }

    pub fn record_failure(&self) {
        self.failures_total.inc();
    }

    pub fn record_payload_size(&self, size_bytes: usize) {
        self.payload_size_bytes.observe(size_bytes as f64);
    }

    pub fn record_latency(&self, duration: std::time::Duration) {
        self.operation_seconds.observe(duration.as_secs_f64());
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SaveError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SaveError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Metrics timer helper for measuring operation durations
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    /// Count the operation and start timing it
    pub fn start(operation: Operation) -> Self {
        if let Some(metrics) = SaveMetrics::global() {
            metrics.record_operation(operation);
        }
        Self {
            start: Instant::now(),
        }
    }

    /// Complete the timer, recording latency
    pub fn finish(self) {
        if let Some(metrics) = SaveMetrics::global() {
            metrics.record_latency(self.start.elapsed());
        }
    }

    /// Complete the timer with an error, recording both latency and the failure
    pub fn finish_with_error(self) {
        if let Some(metrics) = SaveMetrics::global() {
            metrics.record_latency(self.start.elapsed());
            metrics.record_failure();
        }
    }

    /// Complete the timer according to an operation's outcome
    pub fn observe<T, E>(self, result: &std::result::Result<T, E>) {
        match result {
            Ok(_) => self.finish(),
            Err(_) => self.finish_with_error(),
        }
    }
}

/// Initialize structured logging
///
/// # Arguments
/// * `verbose` - Log at `debug` instead of `info` for the savekeep crates
/// * `json` - Emit JSON lines instead of the compact human format
///
/// `RUST_LOG` directives are honored on top of the defaults.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    let _ = SaveMetrics::global();

    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [format!("savekeep_core={level}"), format!("savekeep={level}")] {
        let directive = directive
            .parse::<Directive>()
            .map_err(|e| SaveError::validation(format!("Invalid log directive: {e}")))?;
        filter = filter.add_directive(directive);
    }

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        SaveError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Savekeep logging initialized");
    Ok(())
}
