//! Persisted camera overrides (`camera_config_path`).
//!
//! Values written by `/set` survive restarts through this file and take
//! precedence over the main config.

use super::ConfigError;
use crate::capture::AfMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-camera settings that override the service config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOverrides {
    /// Frame width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Frame height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// JPEG quality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Refresh interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_interval: Option<f64>,
    /// Autofocus mode, set by `/focus`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af_mode: Option<AfMode>,
    /// Locked lens position, set by `/focus`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_position: Option<f32>,
}

impl CameraOverrides {
    /// Loads overrides; a missing or empty file yields no overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(format!("{}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Loads overrides, falling back to none when the file is unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(overrides) => {
                if overrides != Self::default() {
                    tracing::info!("Loaded camera overrides from {}", path.display());
                }
                overrides
            }
            Err(e) => {
                tracing::warn!("{}, ignoring camera overrides", e);
                Self::default()
            }
        }
    }

    /// Writes the overrides back to disk.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::FileWriteError(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Saved camera overrides to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let overrides = CameraOverrides::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(overrides, CameraOverrides::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config-camera.yaml");

        let overrides = CameraOverrides {
            width: Some(2304),
            height: Some(1296),
            af_mode: Some(AfMode::Manual),
            lens_position: Some(1.5),
            ..Default::default()
        };
        overrides.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("af_mode: manual"));
        assert!(!written.contains("quality"));

        assert_eq!(CameraOverrides::load(&path).unwrap(), overrides);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "width: [not, a, number").unwrap();

        assert!(CameraOverrides::load(&path).is_err());
        assert_eq!(
            CameraOverrides::load_or_default(&path),
            CameraOverrides::default()
        );
    }
}
