//! Prometheus metrics for capture and serving.
//!
//! Exposed in text format at `GET /metrics`.
//!
//! # Metrics Exposed
//!
//! ## Capture Metrics
//! - `picam_captures_total` - Successful captures
//! - `picam_capture_failures_total` - Failed captures
//! - `picam_capture_skipped_total` - Attempts rejected while the camera was busy
//! - `picam_capture_duration_seconds` - Capture latency histogram
//! - `picam_last_capture_timestamp_seconds` - Unix time of the latest good capture
//!
//! ## Serving Metrics
//! - `picam_snapshot_requests_total{source}` - Requests by answer source
//!   (`cached`, `captured`, `placeholder`, `unavailable`, `not_modified`)
//!
//! # Example
//!
//! ```no_run
//! use picam_snapshot::metrics::MetricsRegistry;
//! use std::time::Duration;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.record_capture(Duration::from_millis(420), chrono::Utc::now());
//! registry.record_request("cached");
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry};
