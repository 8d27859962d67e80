//! Observability infrastructure for the metrics service
//!
//! Provides:
//! - Prometheus metrics (request outcomes, source attempts, source latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for source latency (in seconds), spanning fast
/// fall-through up to the kubectl timeout
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    requests: IntCounterVec,
    source_attempts: IntCounterVec,
    source_latency_seconds: HistogramVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            requests: register_int_counter_vec!(
                "cluster_metrics_requests_total",
                "Utilization requests by resource and outcome",
                &["resource", "outcome"]
            )
            .expect("Failed to register requests_total"),

            source_attempts: register_int_counter_vec!(
                "cluster_metrics_source_attempts_total",
                "Source attempts by source and outcome",
                &["source", "outcome"]
            )
            .expect("Failed to register source_attempts_total"),

            source_latency_seconds: register_histogram_vec!(
                "cluster_metrics_source_latency_seconds",
                "Time spent reading from a metric source",
                &["source"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register source_latency_seconds"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a handle, registering the global metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    /// Count a finished request
    pub fn record_request(&self, resource: &str, outcome: &str) {
        self.inner()
            .requests
            .with_label_values(&[resource, outcome])
            .inc();
    }

    /// Count one source attempt and observe how long it took
    pub fn record_source_attempt(&self, source: &str, outcome: &str, elapsed: Duration) {
        let inner = self.inner();
        inner
            .source_attempts
            .with_label_values(&[source, outcome])
            .inc();
        inner
            .source_latency_seconds
            .with_label_values(&[source])
            .observe(elapsed.as_secs_f64());
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            listen_addr = %listen_addr,
            "Cluster metrics service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Cluster metrics service shutting down"
        );
    }

    /// Log a source that produced a reading
    pub fn log_source_success(&self, source: &str, resource: &str, node_count: usize, elapsed: Duration) {
        info!(
            event = "source_success",
            service = %self.service,
            source = %source,
            resource = %resource,
            node_count = node_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "Metric source produced a reading"
        );
    }

    /// Log a source with no data; expected when a backend is absent
    pub fn log_source_unavailable(&self, source: &str, resource: &str, reason: &str) {
        debug!(
            event = "source_unavailable",
            service = %self.service,
            source = %source,
            resource = %resource,
            reason = %reason,
            "Metric source unavailable, falling through"
        );
    }

    /// Log a failed source attempt
    ///
    /// `surfaced` says whether the failure ends the request or is swallowed.
    pub fn log_source_failure(&self, source: &str, resource: &str, error: &str, surfaced: bool) {
        if surfaced {
            warn!(
                event = "source_failed",
                service = %self.service,
                source = %source,
                resource = %resource,
                error = %error,
                surfaced = true,
                "Metric source failed"
            );
        } else {
            debug!(
                event = "source_failed",
                service = %self.service,
                source = %source,
                resource = %resource,
                error = %error,
                surfaced = false,
                "Metric source failed, falling through"
            );
        }
    }

    /// Log that no source had data
    pub fn log_no_backend(&self, resource: &str) {
        warn!(
            event = "no_backend",
            service = %self.service,
            resource = %resource,
            "No metric source produced data"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_metrics_recorded_in_registry() {
        let metrics = ServiceMetrics::new();
        metrics.record_request("cpu", "found");
        metrics.record_source_attempt("kubectl", "unavailable", Duration::from_millis(3));

        let families = prometheus::gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"cluster_metrics_requests_total"));
        assert!(names.contains(&"cluster_metrics_source_attempts_total"));
        assert!(names.contains(&"cluster_metrics_source_latency_seconds"));
    }

    #[test]
    fn test_service_metrics_handles_share_state() {
        let first = ServiceMetrics::new();
        let second = first.clone();
        let before = first.inner().requests.with_label_values(&["memory", "test"]).get();

        second.record_request("memory", "test");

        assert_eq!(
            first.inner().requests.with_label_values(&["memory", "test"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-service");
        assert_eq!(logger.service, "test-service");
    }
}
