//! Service configuration loaded from YAML at startup.
//!
//! The settings are immutable once loaded. Everything except the file
//! itself has a default, so a minimal config can be a single `web:` block.

mod limits;
mod overrides;

pub use limits::{constrain, parse_requested, Limits};
pub use overrides::CameraOverrides;

use crate::capture::{CameraBackend, CaptureConfig, DEFAULT_COMMAND};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest allowed refresh interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Resolution used when neither config nor sensor provides one.
const FALLBACK_RESOLUTION: (u32, u32) = (1920, 1080);

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// JPEG quality outside 1-100.
    #[error("invalid JPEG quality {0} (must be 1-100)")]
    InvalidQuality(u32),
    /// Capture timeout is zero.
    #[error("invalid capture timeout")]
    InvalidTimeout,
    /// Lens position is negative or not finite.
    #[error("invalid lens position {0}")]
    InvalidLensPosition(f32),
    /// `web.host` is not an IP address.
    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),
    /// Refresh interval is not finite.
    #[error("invalid capture interval {0}")]
    InvalidInterval(f64),
    /// Health threshold is zero.
    #[error("max_consecutive_failures must be at least 1")]
    InvalidHealthThreshold,
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file could not be written.
    #[error("failed to write config file: {0}")]
    FileWriteError(String),
    /// The YAML is empty or does not match the schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// How snapshot requests choose between the cache and a live capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Serve the cached frame whenever one exists.
    #[default]
    Cached,
    /// Serve each cached frame at most once, then capture on demand.
    Fresh,
    /// Capture on every request.
    Live,
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener.
    #[serde(default)]
    pub web: WebConfig,
    /// Camera device.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Background refresh.
    #[serde(default)]
    pub capture: SchedulerConfig,
    /// Bounds applied to requested settings.
    #[serde(default)]
    pub limits: Limits,
    /// Access log.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health thresholds.
    #[serde(default)]
    pub health: HealthConfig,
    /// Where `/set` persists camera overrides.
    #[serde(default = "default_overrides_path")]
    pub camera_config_path: PathBuf,
}

fn default_overrides_path() -> PathBuf {
    PathBuf::from("config-camera.yaml")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            camera: CameraConfig::default(),
            capture: SchedulerConfig::default(),
            limits: Limits::default(),
            logging: LoggingConfig::default(),
            health: HealthConfig::default(),
            camera_config_path: default_overrides_path(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Image served when a capture fails.
    pub placeholder_image: Option<PathBuf>,
    /// Keys accepted by `/set`.
    pub api_keys: Vec<String>,
    /// Attach a permissive CORS layer.
    pub cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            placeholder_image: Some(PathBuf::from("placeholder.jpg")),
            api_keys: Vec::new(),
            cors: true,
        }
    }
}

/// Camera device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture backend.
    pub backend: CameraBackend,
    /// Device id to select from the listing; index 0 otherwise.
    pub camera_id: Option<String>,
    /// Executable for the rpicam backend.
    pub command: String,
    /// Requested width; sensor maximum when absent.
    pub width: Option<u32>,
    /// Requested height; sensor maximum when absent.
    pub height: Option<u32>,
    /// JPEG quality (1-100).
    pub quality: u8,
    /// Per-capture timeout.
    pub timeout_ms: u64,
    /// EXIF `Model` written into every frame.
    pub model: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::default(),
            camera_id: None,
            command: DEFAULT_COMMAND.into(),
            width: None,
            height: None,
            quality: 90,
            timeout_ms: 1000,
            model: "PiCam2-Service".into(),
        }
    }
}

/// Background refresh settings (`capture` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between refreshes; `None` or <= 0 disables the scheduler.
    pub interval_secs: Option<f64>,
    /// Cache policy while the scheduler runs; ignored without one.
    pub serve: ServeMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: Some(2.0),
            serve: ServeMode::default(),
        }
    }
}

/// Access-log level for one HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLogLevel {
    /// `DEBUG`
    Debug,
    /// `INFO`
    Info,
    /// `WARN`
    #[serde(alias = "warn")]
    Warning,
    /// `ERROR`
    Error,
}

/// Request logging (`logging` section). Absent levels mean silence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for GET and HEAD requests.
    pub get_level: Option<AccessLogLevel>,
    /// Level for POST requests.
    pub post_level: Option<AccessLogLevel>,
}

impl LoggingConfig {
    /// Level at which requests with `method` are logged.
    pub fn level_for(&self, method: &str) -> Option<AccessLogLevel> {
        match method {
            "GET" | "HEAD" => self.get_level,
            "POST" => self.post_level,
            _ => None,
        }
    }
}

/// Capture health thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Failures in a row before `/health` reports unhealthy.
    pub max_consecutive_failures: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&content)
            .map_err(|e| match e {
                ConfigError::ParseError(msg) => {
                    ConfigError::ParseError(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Err(ConfigError::ParseError("config is empty".into()));
        }
        let config: ServiceConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.camera.quality == 0 || self.camera.quality > 100 {
            return Err(ConfigError::InvalidQuality(u32::from(self.camera.quality)));
        }
        if self.camera.width == Some(0) || self.camera.height == Some(0) {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.camera.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if let Some(secs) = self.capture.interval_secs {
            if !secs.is_finite() {
                return Err(ConfigError::InvalidInterval(secs));
            }
        }
        if self.health.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidHealthThreshold);
        }
        Ok(())
    }

    /// Socket address the HTTP server binds.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .web
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.web.host.clone()))?;
        Ok(SocketAddr::new(ip, self.web.port))
    }

    /// Background refresh period, or `None` when the scheduler is off.
    pub fn refresh_interval(&self, overrides: &CameraOverrides) -> Option<Duration> {
        overrides
            .capture_interval
            .or(self.capture.interval_secs)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| Duration::from_secs_f64(secs).max(MIN_REFRESH_INTERVAL))
    }

    /// Serve mode actually used by the snapshot service.
    ///
    /// Without a scheduler nothing refreshes the cache, so every request
    /// captures.
    pub fn effective_serve_mode(&self, overrides: &CameraOverrides) -> ServeMode {
        match self.refresh_interval(overrides) {
            Some(_) => self.capture.serve,
            None => ServeMode::Live,
        }
    }

    /// Merges config, overrides and sensor limits into a capture config.
    pub fn capture_config(
        &self,
        overrides: &CameraOverrides,
        device_index: u32,
        sensor: Option<(u32, u32)>,
    ) -> CaptureConfig {
        let default_size = sensor.unwrap_or(FALLBACK_RESOLUTION);
        let width = overrides.width.or(self.camera.width).unwrap_or(default_size.0);
        let height = overrides.height.or(self.camera.height).unwrap_or(default_size.1);
        let quality = overrides.quality.unwrap_or(self.camera.quality);

        CaptureConfig {
            device_index,
            width: self
                .limits
                .constrain_width(Some(width), sensor.map(|s| s.0)),
            height: self
                .limits
                .constrain_height(Some(height), sensor.map(|s| s.1)),
            quality: self.limits.constrain_quality(Some(u32::from(quality))),
            timeout_ms: self.camera.timeout_ms,
            af_mode: overrides.af_mode,
            lens_position: overrides.lens_position,
        }
    }
}
