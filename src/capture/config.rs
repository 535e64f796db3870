//! Camera capture configuration.
//!
//! This is the resolved, per-device view of the settings: the service
//! config, the overrides file and the sensor limits have already been
//! merged by the time a `CaptureConfig` reaches a backend.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Which capture backend drives the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// `rpicam-still` (or `libcamera-still`) spawned per capture.
    #[default]
    Rpicam,
    /// UVC/V4L2 device through nokhwa (requires the `camera` feature).
    Nokhwa,
    /// Synthetic frames, no hardware.
    Mock,
}

/// Autofocus mode for cameras that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AfMode {
    /// Lens stays where it is put.
    Manual,
    /// One autofocus cycle per capture.
    Auto,
    /// Continuous autofocus.
    Continuous,
}

impl AfMode {
    /// Value passed to `--autofocus-mode`.
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Continuous => "continuous",
        }
    }
}

/// Configuration for camera capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Camera index as reported by the backend's device listing.
    pub device_index: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// JPEG quality (1-100).
    pub quality: u8,
    /// Per-capture timeout handed to the backend, in milliseconds.
    pub timeout_ms: u64,
    /// Autofocus mode, when the lens supports it.
    pub af_mode: Option<AfMode>,
    /// Fixed lens position in dioptres; implies manual focus.
    pub lens_position: Option<f32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 1920,
            height: 1080,
            quality: 90,
            timeout_ms: 1000,
            af_mode: None,
            lens_position: None,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.quality == 0 || self.quality > 100 {
            return Err(ConfigError::InvalidQuality(u32::from(self.quality)));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if let Some(position) = self.lens_position {
            if !position.is_finite() || position < 0.0 {
                return Err(ConfigError::InvalidLensPosition(position));
            }
        }
        Ok(())
    }
}
