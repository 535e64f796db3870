//! Camera abstraction for still capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.

use super::frame::encode_rgb_jpeg;
use super::{CaptureConfig, Frame};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device matches the request.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The device refused to open.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// Settings were rejected.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// A capture produced no usable frame.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// The device is closed.
    #[error("camera not initialized")]
    NotInitialized,
    /// The backend is not compiled in.
    #[error("unsupported camera backend: {0}")]
    Unsupported(String),
}

/// One camera as reported by a backend's device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Index used to select the device.
    pub index: u32,
    /// Sensor or product name.
    pub model: String,
    /// Stable identifier, usable as `camera_id` in the config.
    pub id: String,
    /// Largest supported resolution, when the backend reports one.
    pub max_resolution: Option<(u32, u32)>,
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between real camera hardware
/// and mock implementations for testing.
pub trait Camera {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single JPEG still.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources.
    fn close(&mut self);

    /// Lists the devices this backend can drive. Works while closed.
    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(Vec::new())
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Picks the device index matching `camera_id`, falling back to 0.
pub fn select_device(devices: &[DeviceInfo], camera_id: Option<&str>) -> u32 {
    let Some(wanted) = camera_id else {
        return 0;
    };
    match devices.iter().find(|device| device.id == wanted) {
        Some(device) => device.index,
        None => {
            tracing::warn!(
                camera_id = wanted,
                "Configured camera ID not found, defaulting to index 0"
            );
            0
        }
    }
}

/// Mock camera for testing that generates synthetic JPEG frames.
#[derive(Debug, Default)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    fault: Arc<AtomicBool>,
}

impl MockCamera {
    /// Creates a mock camera that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock camera whose captures fail while `fault` is set.
    pub fn with_fault(fault: Arc<AtomicBool>) -> Self {
        Self {
            fault,
            ..Self::default()
        }
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!("MockCamera opened with config: {:?}", config);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;

        if self.fault.load(Ordering::SeqCst) {
            return Err(CameraError::CaptureFailed("simulated sensor fault".into()));
        }

        self.sequence += 1;
        let shift = (self.sequence % 256) as u32;
        let image = RgbImage::from_fn(config.width, config.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x ^ y) % 256) as u8,
            ])
        });
        let jpeg = encode_rgb_jpeg(&image, config.quality)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        Ok(Frame::new(jpeg, config.width, config.height, self.sequence)
            .with_metadata(format!("mock #{}", self.sequence)))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("MockCamera closed");
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(vec![DeviceInfo {
            index: 0,
            model: "mock".into(),
            id: "mock-0".into(),
            max_resolution: Some((1920, 1080)),
        }])
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
