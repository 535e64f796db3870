//! Exclusive owner of the camera device.
//!
//! One `CameraHandle` exists per process. It is shared by `Arc` between the
//! capture scheduler and the HTTP handlers; the mutex is the only path to
//! the hardware, so at most one capture is ever in flight.

use super::{Camera, CameraError, CaptureConfig, DeviceInfo, Frame};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use thiserror::Error;

/// Outcome of a non-blocking capture attempt.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Another capture holds the device.
    #[error("camera is busy with another capture")]
    Busy,
    /// The backend failed.
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Owned, lock-guarded camera device.
pub struct CameraHandle {
    camera: Mutex<Box<dyn Camera + Send>>,
    config: Mutex<CaptureConfig>,
    backend: &'static str,
}

impl CameraHandle {
    /// Opens `camera` with `config` and takes ownership of it.
    pub fn open(mut camera: Box<dyn Camera + Send>, config: CaptureConfig) -> Result<Self, CameraError> {
        camera.open(&config)?;
        tracing::info!(
            backend = camera.backend_name(),
            width = config.width,
            height = config.height,
            quality = config.quality,
            "Camera handle acquired"
        );
        Ok(Self {
            backend: camera.backend_name(),
            camera: Mutex::new(camera),
            config: Mutex::new(config),
        })
    }

    /// Captures a frame unless another capture holds the device.
    ///
    /// Overlapping attempts fail with [`CaptureError::Busy`] instead of
    /// queueing behind the hardware.
    pub fn try_capture(&self) -> Result<Frame, CaptureError> {
        let mut camera = match self.camera.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(CaptureError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Ok(camera.capture()?)
    }

    /// Returns the active capture configuration.
    pub fn config(&self) -> CaptureConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reopens the device with a new configuration.
    ///
    /// Blocks until any in-flight capture finishes. If the new settings are
    /// rejected the previous configuration is restored.
    pub fn reconfigure(&self, config: CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let mut camera = self.lock_camera();
        let previous = self.config();
        camera.close();

        if let Err(e) = camera.open(&config) {
            tracing::warn!(error = %e, "Reconfiguration rejected, restoring previous settings");
            camera.open(&previous)?;
            return Err(e);
        }

        tracing::info!(
            width = config.width,
            height = config.height,
            quality = config.quality,
            "Camera reconfigured"
        );
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Closes the device, waits `pause`, then opens it again.
    pub fn restart(&self, pause: Duration) -> Result<(), CameraError> {
        let mut camera = self.lock_camera();
        camera.close();
        std::thread::sleep(pause);
        camera.open(&self.config())?;
        tracing::info!(backend = camera.backend_name(), "Camera restarted");
        Ok(())
    }

    /// Lists the devices visible to the backend.
    pub fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        self.lock_camera().devices()
    }

    /// Returns the backend name. Never waits on the device.
    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    /// Checks whether the device is open.
    pub fn is_open(&self) -> bool {
        self.lock_camera().is_open()
    }

    /// Releases the device. Further captures fail with `NotInitialized`.
    pub fn close(&self) {
        let mut camera = self.lock_camera();
        if camera.is_open() {
            camera.close();
            tracing::info!("Camera handle released");
        }
    }

    fn lock_camera(&self) -> MutexGuard<'_, Box<dyn Camera + Send>> {
        self.camera.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("backend", &self.backend)
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn handle() -> CameraHandle {
        CameraHandle::open(
            Box::new(MockCamera::new()),
            CaptureConfig::with_dimensions(32, 24),
        )
        .unwrap()
    }

    #[test]
    fn test_open_and_capture() {
        let handle = handle();
        assert!(handle.is_open());
        let frame = handle.try_capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.width(), 32);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let result = CameraHandle::open(
            Box::new(MockCamera::new()),
            CaptureConfig::with_dimensions(0, 24),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_overlapping_capture_is_busy() {
        let handle = handle();
        let _held = handle.lock_camera();
        assert!(matches!(handle.try_capture(), Err(CaptureError::Busy)));
    }

    #[test]
    fn test_backend_name_while_capture_in_flight() {
        let handle = handle();
        let _held = handle.lock_camera();
        assert_eq!(handle.backend_name(), "mock");
    }

    #[test]
    fn test_hardware_error_passes_through() {
        let fault = Arc::new(AtomicBool::new(true));
        let handle = CameraHandle::open(
            Box::new(MockCamera::with_fault(fault)),
            CaptureConfig::with_dimensions(16, 16),
        )
        .unwrap();
        assert!(matches!(
            handle.try_capture(),
            Err(CaptureError::Camera(CameraError::CaptureFailed(_)))
        ));
    }

    #[test]
    fn test_reconfigure_changes_geometry() {
        let handle = handle();
        handle
            .reconfigure(CaptureConfig::with_dimensions(48, 40))
            .unwrap();
        assert_eq!(handle.config().width, 48);
        assert_eq!(handle.try_capture().unwrap().height(), 40);
    }

    #[test]
    fn test_reconfigure_rejects_invalid_and_keeps_previous() {
        let handle = handle();
        assert!(handle
            .reconfigure(CaptureConfig::with_dimensions(0, 0))
            .is_err());
        assert_eq!(handle.config().width, 32);
        assert!(handle.try_capture().is_ok());
    }

    #[test]
    fn test_restart_and_close() {
        let handle = handle();
        handle.restart(Duration::from_millis(1)).unwrap();
        assert!(handle.try_capture().is_ok());

        handle.close();
        assert!(!handle.is_open());
        assert!(matches!(
            handle.try_capture(),
            Err(CaptureError::Camera(CameraError::NotInitialized))
        ));
    }
}
