//! Raspberry Pi camera backend driven through `rpicam-still`.
//!
//! Each capture spawns the still-capture tool with JPEG output on stdout.
//! The tool owns the libcamera pipeline for the duration of the call, so
//! the device is free between captures.

use super::{Camera, CameraError, CaptureConfig, DeviceInfo, Frame};
use std::io::ErrorKind;
use std::process::{Command, Output, Stdio};

/// Default still-capture executable (`libcamera-still` on older images).
pub const DEFAULT_COMMAND: &str = "rpicam-still";

/// Camera backed by the rpicam/libcamera command-line tools.
#[derive(Debug)]
pub struct RpicamCamera {
    command: String,
    config: Option<CaptureConfig>,
    sequence: u64,
}

impl RpicamCamera {
    /// Creates a backend that runs `command` for every capture.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            config: None,
            sequence: 0,
        }
    }

    /// Builds the argument list for a single JPEG capture to stdout.
    pub fn capture_args(config: &CaptureConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--nopreview".into(),
            "--immediate".into(),
            "-t".into(),
            config.timeout_ms.to_string(),
            "-e".into(),
            "jpg".into(),
            "-q".into(),
            config.quality.to_string(),
            "--width".into(),
            config.width.to_string(),
            "--height".into(),
            config.height.to_string(),
            "--camera".into(),
            config.device_index.to_string(),
        ];

        // A fixed lens position only sticks in manual mode.
        if let Some(position) = config.lens_position {
            args.extend([
                "--autofocus-mode".into(),
                "manual".into(),
                "--lens-position".into(),
                position.to_string(),
            ]);
        } else if let Some(mode) = config.af_mode {
            args.extend(["--autofocus-mode".into(), mode.as_arg().into()]);
        }

        args.extend(["-o".into(), "-".into()]);
        args
    }

    fn run(&self, args: &[String]) -> Result<Output, CameraError> {
        Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    CameraError::DeviceNotFound(format!("{} is not installed", self.command))
                }
                _ => CameraError::OpenFailed(format!("failed to run {}: {}", self.command, e)),
            })
    }
}

impl Default for RpicamCamera {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND)
    }
}

impl Camera for RpicamCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let devices = self.devices()?;
        if devices.is_empty() {
            return Err(CameraError::DeviceNotFound(format!(
                "no cameras reported by {}",
                self.command
            )));
        }
        if !devices.iter().any(|d| d.index == config.device_index) {
            return Err(CameraError::DeviceNotFound(format!(
                "camera index {}",
                config.device_index
            )));
        }

        self.config = Some(config.clone());
        tracing::info!(
            command = %self.command,
            index = config.device_index,
            width = config.width,
            height = config.height,
            "rpicam camera opened"
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        let output = self.run(&Self::capture_args(config))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no diagnostic output");
            return Err(CameraError::CaptureFailed(format!(
                "{} exited with {}: {}",
                self.command, output.status, reason
            )));
        }

        self.sequence += 1;
        let frame = Frame::new(output.stdout, config.width, config.height, self.sequence)
            .with_metadata(format!(
                "{} {}x{} q{}",
                self.command, config.width, config.height, config.quality
            ));
        if !frame.is_valid() {
            return Err(CameraError::CaptureFailed(format!(
                "{} did not produce a JPEG",
                self.command
            )));
        }
        Ok(frame)
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        if self.config.take().is_some() {
            tracing::info!(command = %self.command, "rpicam camera closed");
        }
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let output = self.run(&["--list-cameras".to_string()])?;
        // The listing goes to stdout or stderr depending on the tool version.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_camera_list(&text))
    }

    fn backend_name(&self) -> &'static str {
        "rpicam"
    }
}

/// Parses the `--list-cameras` text output.
///
/// Camera lines look like
/// `0 : imx708 [4608x2592 10-bit RGGB] (/base/soc/i2c0mux/i2c@1/imx708@1a)`;
/// mode lines and headers are ignored.
pub fn parse_camera_list(text: &str) -> Vec<DeviceInfo> {
    text.lines().filter_map(parse_camera_line).collect()
}

fn parse_camera_line(line: &str) -> Option<DeviceInfo> {
    let (index, rest) = line.trim().split_once(" : ")?;
    let index: u32 = index.trim().parse().ok()?;

    let (model, rest) = match rest.split_once('[') {
        Some((model, rest)) => (model.trim(), Some(rest)),
        None => (rest.split_whitespace().next()?, None),
    };

    let max_resolution = rest
        .and_then(|r| r.split(|c: char| c == ' ' || c == ']').next())
        .and_then(|size| size.split_once('x'))
        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));

    let id = match (line.rfind('('), line.rfind(')')) {
        (Some(open), Some(close)) if open < close => line[open + 1..close].to_string(),
        _ => format!("{}:{}", model, index),
    };

    Some(DeviceInfo {
        index,
        model: model.to_string(),
        id,
        max_resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::AfMode;

    const LISTING: &str = "Available cameras
-----------------
0 : imx708 [4608x2592 10-bit RGGB] (/base/soc/i2c0mux/i2c@1/imx708@1a)
    Modes: 'SRGGB10_CSI2P' : 1536x864 [120.13 fps - (768, 432)/3072x1728 crop]
                             2304x1296 [56.03 fps - (0, 0)/4608x2592 crop]
1 : imx219 [3280x2464 10-bit RGGB] (/base/soc/i2c0mux/i2c@0/imx219@10)
";

    #[test]
    fn test_parse_camera_list() {
        let devices = parse_camera_list(LISTING);
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].index, 0);
        assert_eq!(devices[0].model, "imx708");
        assert_eq!(devices[0].id, "/base/soc/i2c0mux/i2c@1/imx708@1a");
        assert_eq!(devices[0].max_resolution, Some((4608, 2592)));

        assert_eq!(devices[1].index, 1);
        assert_eq!(devices[1].model, "imx219");
        assert_eq!(devices[1].max_resolution, Some((3280, 2464)));
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_camera_list("No cameras available!\n").is_empty());
    }

    #[test]
    fn test_capture_args_include_geometry() {
        let mut config = CaptureConfig::with_dimensions(1280, 720);
        config.quality = 85;
        config.device_index = 1;
        let args = RpicamCamera::capture_args(&config);

        let joined = args.join(" ");
        assert!(joined.contains("--width 1280"));
        assert!(joined.contains("--height 720"));
        assert!(joined.contains("-q 85"));
        assert!(joined.contains("--camera 1"));
        assert!(joined.ends_with("-o -"));
        assert!(!joined.contains("--autofocus-mode"));
    }

    #[test]
    fn test_lens_position_forces_manual_focus() {
        let mut config = CaptureConfig::default();
        config.af_mode = Some(AfMode::Continuous);
        config.lens_position = Some(2.5);
        let joined = RpicamCamera::capture_args(&config).join(" ");

        assert!(joined.contains("--autofocus-mode manual"));
        assert!(joined.contains("--lens-position 2.5"));
        assert!(!joined.contains("continuous"));
    }

    #[test]
    fn test_missing_command_is_device_not_found() {
        let mut camera = RpicamCamera::new("definitely-not-a-camera-tool");
        let result = camera.open(&CaptureConfig::default());
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
        assert!(!camera.is_open());
    }
}
