//! Periodic capture-and-cache.
//!
//! Keeps the camera warm and the cache recent so requests rarely wait on
//! hardware. Ticks that find the camera busy are skipped; missed ticks are
//! dropped rather than replayed in a burst.

use crate::capture::CaptureError;
use crate::config::MIN_REFRESH_INTERVAL;
use crate::service::SnapshotService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task refreshing the frame cache on a fixed interval.
#[derive(Debug)]
pub struct CaptureScheduler {
    service: Arc<SnapshotService>,
    interval: Duration,
}

impl CaptureScheduler {
    /// Creates a scheduler; intervals below [`MIN_REFRESH_INTERVAL`] are raised to it.
    pub fn new(service: Arc<SnapshotService>, interval: Duration) -> Self {
        Self {
            service,
            interval: interval.max(MIN_REFRESH_INTERVAL),
        }
    }

    /// Effective refresh period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the scheduler on the current runtime until `shutdown` turns true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Capture loop. The first capture happens immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Capture scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Capture scheduler stopped");
    }

    async fn tick(&self) {
        match self.service.refresh().await {
            Ok(frame) => tracing::debug!(
                sequence = frame.sequence(),
                bytes = frame.jpeg().len(),
                "Cache refreshed"
            ),
            Err(CaptureError::Busy) => {
                tracing::debug!("Camera busy, skipping scheduled capture")
            }
            Err(e) => tracing::warn!(error = %e, "Scheduled capture failed, keeping previous frame"),
        }
    }
}
