//! Capture health monitoring.
//!
//! Tracks capture outcomes over time. A run of failures marks the camera
//! unhealthy; one good capture brings it back.

use chrono::{DateTime, Utc};
use std::fmt::Display;

/// Current health status of the camera.
#[derive(Debug, Clone)]
pub struct HealthMetrics {
    /// Whether captures are currently succeeding.
    pub is_healthy: bool,
    /// Consecutive successful captures.
    pub consecutive_successes: u64,
    /// Consecutive failed captures.
    pub consecutive_failures: u64,
    /// Total successful captures.
    pub total_captures: u64,
    /// Total failed captures.
    pub total_failures: u64,
    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,
    /// Time of the most recent successful capture.
    pub last_success: Option<DateTime<Utc>>,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            // The handle only exists once the camera opened.
            is_healthy: true,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_captures: 0,
            total_failures: 0,
            last_error: None,
            last_success: None,
        }
    }
}

/// Monitors capture health over time.
#[derive(Debug)]
pub struct CaptureHealth {
    metrics: HealthMetrics,
    /// Failures in a row that flip the status to unhealthy.
    max_consecutive_failures: u64,
}

impl CaptureHealth {
    /// Creates a monitor that tolerates `max_consecutive_failures - 1` failures.
    pub fn new(max_consecutive_failures: u64) -> Self {
        Self {
            metrics: HealthMetrics::default(),
            max_consecutive_failures: max_consecutive_failures.max(1),
        }
    }

    /// Records a successful capture.
    pub fn record_success(&mut self, captured_at: DateTime<Utc>) -> &HealthMetrics {
        self.metrics.total_captures += 1;
        self.metrics.consecutive_successes += 1;
        self.metrics.consecutive_failures = 0;
        self.metrics.last_success = Some(captured_at);

        if !self.metrics.is_healthy {
            tracing::info!(
                failures = self.metrics.total_failures,
                "Camera recovered"
            );
        }
        self.metrics.is_healthy = true;
        &self.metrics
    }

    /// Records a failed capture.
    pub fn record_failure(&mut self, error: &dyn Display) -> &HealthMetrics {
        self.metrics.total_failures += 1;
        self.metrics.consecutive_failures += 1;
        self.metrics.consecutive_successes = 0;
        self.metrics.last_error = Some(error.to_string());

        if self.metrics.consecutive_failures >= self.max_consecutive_failures {
            if self.metrics.is_healthy {
                tracing::warn!(
                    streak = self.metrics.consecutive_failures,
                    error = %error,
                    "Camera became unhealthy"
                );
            }
            self.metrics.is_healthy = false;
        }
        &self.metrics
    }

    /// Returns current health metrics.
    pub fn metrics(&self) -> &HealthMetrics {
        &self.metrics
    }

    /// Returns true while captures are succeeding.
    pub fn is_healthy(&self) -> bool {
        self.metrics.is_healthy
    }
}

impl Default for CaptureHealth {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_healthy() {
        let health = CaptureHealth::default();
        assert!(health.is_healthy());
        assert_eq!(health.metrics().total_captures, 0);
    }

    #[test]
    fn test_becomes_unhealthy_after_streak() {
        let mut health = CaptureHealth::new(2);

        health.record_failure(&"timeout");
        assert!(health.is_healthy());

        health.record_failure(&"timeout");
        assert!(!health.is_healthy());
        assert_eq!(health.metrics().last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_single_success_recovers() {
        let mut health = CaptureHealth::new(1);
        health.record_failure(&"no frame");
        assert!(!health.is_healthy());

        let metrics = health.record_success(Utc::now());
        assert!(metrics.is_healthy);
        assert_eq!(metrics.consecutive_failures, 0);
        assert_eq!(metrics.total_failures, 1);
        assert_eq!(metrics.total_captures, 1);
    }
}
