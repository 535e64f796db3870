//! Capture-and-cache service shared by the scheduler and the HTTP handlers.

use crate::capture::{CameraError, CameraHandle, CaptureError};
use crate::config::ServeMode;
use crate::health::{CaptureHealth, HealthMetrics};
use crate::metrics::MetricsRegistry;
use crate::snapshot::{CachedFrame, FrameCache};
use bytes::Bytes;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default EXIF `Model` tag.
pub const DEFAULT_EXIF_MODEL: &str = "PiCam2-Service";

/// How long a request that finds the camera busy and the cache empty waits
/// for the in-flight capture to land.
const BUSY_WAIT: Duration = Duration::from_secs(2);
const BUSY_POLL: Duration = Duration::from_millis(25);

/// Where a served frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Taken from the cache without touching the camera.
    Cached,
    /// Captured synchronously for this request.
    Captured,
}

impl SnapshotSource {
    /// Label used in logs and response headers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Captured => "captured",
        }
    }
}

/// What a snapshot request resolved to.
#[derive(Debug, Clone)]
pub enum Snapshot {
    /// A camera frame.
    Frame {
        /// The stamped frame.
        frame: Arc<CachedFrame>,
        /// Whether it came from the cache or a fresh capture.
        source: SnapshotSource,
    },
    /// Configured stand-in image served after a failed capture.
    Placeholder(Bytes),
}

/// Owns the frame cache and arbitrates access to the camera.
pub struct SnapshotService {
    camera: Arc<CameraHandle>,
    cache: FrameCache,
    metrics: Arc<MetricsRegistry>,
    health: Mutex<CaptureHealth>,
    mode: ServeMode,
    exif_model: String,
    placeholder: Option<Bytes>,
}

impl SnapshotService {
    /// Creates a service around an opened camera.
    pub fn new(camera: Arc<CameraHandle>, metrics: Arc<MetricsRegistry>, mode: ServeMode) -> Self {
        Self {
            camera,
            cache: FrameCache::new(),
            metrics,
            health: Mutex::new(CaptureHealth::default()),
            mode,
            exif_model: DEFAULT_EXIF_MODEL.to_string(),
            placeholder: None,
        }
    }

    /// Sets the EXIF `Model` tag written into every frame.
    pub fn with_exif_model(mut self, model: impl Into<String>) -> Self {
        self.exif_model = model.into();
        self
    }

    /// Sets the image served when a capture fails.
    pub fn with_placeholder(mut self, placeholder: Option<Bytes>) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Sets how many failures in a row mark the camera unhealthy.
    pub fn with_health_threshold(mut self, max_consecutive_failures: u64) -> Self {
        self.health = Mutex::new(CaptureHealth::new(max_consecutive_failures));
        self
    }

    /// Captures one frame on the blocking pool and stamps it.
    ///
    /// Does not touch the cache. Fails with [`CaptureError::Busy`] when
    /// another capture holds the camera.
    pub async fn capture(&self) -> Result<Arc<CachedFrame>, CaptureError> {
        let camera = Arc::clone(&self.camera);
        let model = self.exif_model.clone();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            camera
                .try_capture()
                .map(|frame| Arc::new(CachedFrame::from_frame(frame, &model)))
        })
        .await
        .unwrap_or_else(|e| {
            Err(CaptureError::Camera(CameraError::CaptureFailed(format!(
                "capture task failed: {e}"
            ))))
        });

        match &result {
            Ok(frame) => {
                self.metrics
                    .record_capture(started.elapsed(), frame.captured_at());
                self.lock_health().record_success(frame.captured_at());
            }
            Err(CaptureError::Busy) => self.metrics.record_skipped(),
            Err(CaptureError::Camera(e)) => {
                self.metrics.record_failure();
                self.lock_health().record_failure(e);
            }
        }
        result
    }

    /// Captures a frame and swaps it into the cache as unserved.
    ///
    /// On failure the previous frame stays cached.
    pub async fn refresh(&self) -> Result<Arc<CachedFrame>, CaptureError> {
        let frame = self.capture().await?;
        self.cache.store(Arc::clone(&frame), false);
        Ok(frame)
    }

    /// Resolves a snapshot request according to the serve mode.
    ///
    /// `force_cached` serves any cached frame regardless of mode or staleness.
    /// An error means nothing could be served.
    pub async fn snapshot(&self, force_cached: bool) -> Result<Snapshot, CaptureError> {
        let cached = if force_cached {
            self.cache.latest()
        } else {
            match self.mode {
                ServeMode::Cached => self.cache.latest(),
                ServeMode::Fresh => self.cache.take_fresh(),
                ServeMode::Live => None,
            }
        };
        if let Some(frame) = cached {
            return Ok(Snapshot::Frame {
                frame,
                source: SnapshotSource::Cached,
            });
        }

        match self.capture().await {
            Ok(frame) => {
                self.cache.store(Arc::clone(&frame), true);
                Ok(Snapshot::Frame {
                    frame,
                    source: SnapshotSource::Captured,
                })
            }
            Err(CaptureError::Busy) => match self.wait_for_cached().await {
                Some(frame) => {
                    tracing::debug!("Camera busy, serving cached frame");
                    Ok(Snapshot::Frame {
                        frame,
                        source: SnapshotSource::Cached,
                    })
                }
                None => self.fallback(CaptureError::Busy),
            },
            Err(e) => {
                tracing::warn!(error = %e, "On-demand capture failed");
                self.fallback(e)
            }
        }
    }

    async fn wait_for_cached(&self) -> Option<Arc<CachedFrame>> {
        let deadline = Instant::now() + BUSY_WAIT;
        loop {
            if let Some(frame) = self.cache.latest() {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(BUSY_POLL).await;
        }
    }

    fn fallback(&self, error: CaptureError) -> Result<Snapshot, CaptureError> {
        match &self.placeholder {
            Some(bytes) => Ok(Snapshot::Placeholder(bytes.clone())),
            None => Err(error),
        }
    }

    /// The shared camera handle.
    pub fn camera(&self) -> &Arc<CameraHandle> {
        &self.camera
    }

    /// The frame cache.
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    /// The prometheus registry.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Snapshot of the capture health counters.
    pub fn health(&self) -> HealthMetrics {
        self.lock_health().metrics().clone()
    }

    fn lock_health(&self) -> std::sync::MutexGuard<'_, CaptureHealth> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotService")
            .field("camera", &self.camera)
            .field("mode", &self.mode)
            .field("exif_model", &self.exif_model)
            .field("placeholder", &self.placeholder.as_ref().map(Bytes::len))
            .finish_non_exhaustive()
    }
}

/// Reads the placeholder image, if one is configured and readable.
pub fn load_placeholder(path: Option<&Path>) -> Option<Bytes> {
    let path = path?;
    match std::fs::read(path) {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), bytes = bytes.len(), "Loaded placeholder image");
            Some(Bytes::from(bytes))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Placeholder image unavailable");
            None
        }
    }
}
