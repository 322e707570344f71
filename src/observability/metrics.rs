use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the idempotency provider and its cache backends.
#[derive(Debug)]
pub struct Metrics {
    ttl_renewal_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ttl_renewal_failures: AtomicU64::new(0),
        }
    }

    /// `result` is one of `passthrough`, `replayed` or `executed`.
    pub fn record_idempotent_request(&self, result: &'static str) {
        counter!("idempotency_requests_total", "result" => result).increment(1);
    }

    pub fn record_outcome_cached(&self, status: u16) {
        counter!("idempotency_outcomes_cached_total", "status" => status.to_string()).increment(1);
    }

    pub fn record_cache_error(&self, stage: &'static str, kind: &'static str) {
        counter!("idempotency_cache_errors_total", "stage" => stage, "kind" => kind).increment(1);
    }

    pub fn record_cache_operation(&self, backend: &'static str, operation: &'static str, duration_ms: f64, success: bool) {
        counter!("cache_operations_total", "backend" => backend, "operation" => operation, "success" => success.to_string()).increment(1);
        histogram!("cache_operation_duration_ms", "backend" => backend, "operation" => operation).record(duration_ms);
    }

    pub fn record_ttl_renewal_failure(&self, backend: &'static str) {
        self.ttl_renewal_failures.fetch_add(1, Ordering::Relaxed);
        counter!("cache_ttl_renewal_failures_total", "backend" => backend).increment(1);
    }

    /// Renewal failures recorded by this process, across all backends.
    pub fn ttl_renewal_failures(&self) -> u64 {
        self.ttl_renewal_failures.load(Ordering::Relaxed)
    }

    pub fn record_entries_purged(&self, backend: &'static str, count: u64) {
        counter!("cache_entries_purged_total", "backend" => backend).increment(count);
    }

    pub fn record_http_request(&self, method: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("idempotency_requests_total", Unit::Count, "Idempotent executions by result (passthrough, replayed, executed)");
    describe_counter!("idempotency_outcomes_cached_total", Unit::Count, "Successful outcomes written to the cache");
    describe_counter!("idempotency_cache_errors_total", Unit::Count, "Cache-layer failures absorbed by the provider");

    describe_counter!("cache_operations_total", Unit::Count, "Cache backend operations");
    describe_histogram!("cache_operation_duration_ms", Unit::Milliseconds, "Cache backend operation latency in milliseconds");
    describe_counter!("cache_ttl_renewal_failures_total", Unit::Count, "Failed time-to-idle renewals on read");
    describe_counter!("cache_entries_purged_total", Unit::Count, "Expired entries physically removed by the sweeper");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
