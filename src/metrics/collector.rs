//! Metrics collection and registry.

use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for capture and serving.
pub struct MetricsRegistry {
    registry: Registry,

    // Capture metrics
    captures_total: IntCounter,
    capture_failures_total: IntCounter,
    capture_skipped_total: IntCounter,
    capture_duration: Histogram,
    last_capture_timestamp: Gauge,

    // Serving metrics
    snapshot_requests: IntCounterVec,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all service metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let captures_total = IntCounter::new(
            "picam_captures_total",
            "Total number of successful captures",
        )?;
        let capture_failures_total = IntCounter::new(
            "picam_capture_failures_total",
            "Total number of failed captures",
        )?;
        let capture_skipped_total = IntCounter::new(
            "picam_capture_skipped_total",
            "Capture attempts rejected because the camera was busy",
        )?;
        let capture_duration = Histogram::with_opts(
            HistogramOpts::new(
                "picam_capture_duration_seconds",
                "Wall time of a capture including JPEG stamping",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;
        let last_capture_timestamp = Gauge::new(
            "picam_last_capture_timestamp_seconds",
            "Unix time of the most recent successful capture",
        )?;
        let snapshot_requests = IntCounterVec::new(
            Opts::new(
                "picam_snapshot_requests_total",
                "Snapshot requests by how they were answered",
            ),
            &["source"],
        )?;

        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(capture_failures_total.clone()))?;
        registry.register(Box::new(capture_skipped_total.clone()))?;
        registry.register(Box::new(capture_duration.clone()))?;
        registry.register(Box::new(last_capture_timestamp.clone()))?;
        registry.register(Box::new(snapshot_requests.clone()))?;

        Ok(Self {
            registry,
            captures_total,
            capture_failures_total,
            capture_skipped_total,
            capture_duration,
            last_capture_timestamp,
            snapshot_requests,
        })
    }

    /// Records a successful capture.
    pub fn record_capture(&self, elapsed: Duration, captured_at: DateTime<Utc>) {
        self.captures_total.inc();
        self.capture_duration.observe(elapsed.as_secs_f64());
        self.last_capture_timestamp
            .set(captured_at.timestamp_millis() as f64 / 1000.0);
    }

    /// Records a failed capture.
    pub fn record_failure(&self) {
        self.capture_failures_total.inc();
    }

    /// Records a capture rejected because the camera was busy.
    pub fn record_skipped(&self) {
        self.capture_skipped_total.inc();
    }

    /// Counts a snapshot request answered from `source`.
    pub fn record_request(&self, source: &str) {
        self.snapshot_requests.with_label_values(&[source]).inc();
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("captures_total", &self.captures_total.get())
            .field("capture_failures_total", &self.capture_failures_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_capture_metrics() {
        let registry = MetricsRegistry::new().unwrap();

        registry.record_capture(Duration::from_millis(300), Utc::now());
        registry.record_capture(Duration::from_millis(200), Utc::now());
        registry.record_failure();
        registry.record_skipped();

        let output = registry.encode().unwrap();
        assert!(output.contains("picam_captures_total 2"));
        assert!(output.contains("picam_capture_failures_total 1"));
        assert!(output.contains("picam_capture_skipped_total 1"));
        assert!(output.contains("picam_capture_duration_seconds_count 2"));
    }

    #[test]
    fn test_request_labels() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_request("cached");
        registry.record_request("cached");
        registry.record_request("unavailable");

        let output = registry.encode().unwrap();
        assert!(output.contains("picam_snapshot_requests_total{source=\"cached\"} 2"));
        assert!(output.contains("picam_snapshot_requests_total{source=\"unavailable\"} 1"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("picam_captures_total"));
        assert!(output.contains("picam_last_capture_timestamp_seconds"));
    }
}
