//! Camera input and frame handling.
//!
//! This module provides the camera abstraction, the concrete backends, and
//! the [`CameraHandle`] that owns the device for the life of the process.

mod camera;
mod config;
mod frame;
mod handle;
mod rpicam;
#[cfg(feature = "camera")]
mod uvc;

pub use camera::{select_device, Camera, CameraError, DeviceInfo, MockCamera};
pub use config::{AfMode, CameraBackend, CaptureConfig};
pub use frame::{Frame, JPEG_MAGIC};
pub use handle::{CameraHandle, CaptureError};
pub use rpicam::{parse_camera_list, RpicamCamera, DEFAULT_COMMAND};
#[cfg(feature = "camera")]
pub use uvc::NokhwaCamera;

/// Instantiates the (still closed) backend selected in the config.
pub fn create_backend(
    backend: CameraBackend,
    command: &str,
) -> Result<Box<dyn Camera + Send>, CameraError> {
    match backend {
        CameraBackend::Rpicam => Ok(Box::new(RpicamCamera::new(command))),
        #[cfg(feature = "camera")]
        CameraBackend::Nokhwa => Ok(Box::new(NokhwaCamera::new())),
        #[cfg(not(feature = "camera"))]
        CameraBackend::Nokhwa => Err(CameraError::Unsupported(
            "nokhwa backend requires the `camera` feature".into(),
        )),
        CameraBackend::Mock => Ok(Box::new(MockCamera::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_backend() {
        let camera = create_backend(CameraBackend::Mock, DEFAULT_COMMAND).unwrap();
        assert_eq!(camera.backend_name(), "mock");
        assert!(!camera.is_open());
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn test_nokhwa_requires_feature() {
        assert!(matches!(
            create_backend(CameraBackend::Nokhwa, DEFAULT_COMMAND),
            Err(CameraError::Unsupported(_))
        ));
    }
}
