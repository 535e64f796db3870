//! UVC/V4L2 camera backend through nokhwa.
//!
//! nokhwa's device handle is not `Send`, so it lives on a dedicated
//! thread and the backend talks to it over a channel.

use super::frame::encode_rgb_jpeg;
use super::{Camera, CameraError, CaptureConfig, DeviceInfo, Frame};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

type RawFrame = (u32, u32, Vec<u8>);

enum Request {
    Capture(Sender<Result<RawFrame, CameraError>>),
    Close,
}

struct Worker {
    requests: Sender<Request>,
    thread: JoinHandle<()>,
}

/// Camera driven by nokhwa on its own thread.
#[derive(Default)]
pub struct NokhwaCamera {
    worker: Option<Worker>,
    config: Option<CaptureConfig>,
    sequence: u64,
}

impl NokhwaCamera {
    /// Creates a closed nokhwa camera.
    pub fn new() -> Self {
        Self::default()
    }
}

fn device_loop(config: CaptureConfig, ready: Sender<Result<(), CameraError>>, requests: Receiver<Request>) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        30,
    )));

    let opened = nokhwa::Camera::new(CameraIndex::Index(config.device_index), format)
        .and_then(|mut device| {
            device.open_stream()?;
            Ok(device)
        });
    let mut device = match opened {
        Ok(device) => {
            let _ = ready.send(Ok(()));
            device
        }
        Err(e) => {
            let _ = ready.send(Err(CameraError::OpenFailed(e.to_string())));
            return;
        }
    };

    while let Ok(request) = requests.recv() {
        match request {
            Request::Capture(reply) => {
                let result = device
                    .frame()
                    .and_then(|buffer| buffer.decode_image::<RgbFormat>())
                    .map(|rgb| (rgb.width(), rgb.height(), rgb.into_raw()))
                    .map_err(|e| CameraError::CaptureFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Request::Close => break,
        }
    }

    if let Err(e) = device.stop_stream() {
        tracing::warn!(error = %e, "Failed to stop nokhwa stream");
    }
}

impl Camera for NokhwaCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.close();

        let (requests, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let device_config = config.clone();
        let thread = thread::Builder::new()
            .name("nokhwa-camera".into())
            .spawn(move || device_loop(device_config, ready_tx, receiver))
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CameraError::OpenFailed("camera thread exited".into()));
            }
        }

        self.worker = Some(Worker { requests, thread });
        self.config = Some(config.clone());
        tracing::info!(index = config.device_index, "nokhwa camera opened");
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        let worker = self.worker.as_ref().ok_or(CameraError::NotInitialized)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        worker
            .requests
            .send(Request::Capture(reply_tx))
            .map_err(|_| CameraError::CaptureFailed("camera thread is gone".into()))?;
        let (width, height, raw) = reply_rx
            .recv()
            .map_err(|_| CameraError::CaptureFailed("camera thread is gone".into()))??;

        let image = RgbImage::from_raw(width, height, raw)
            .ok_or_else(|| CameraError::CaptureFailed("frame buffer size mismatch".into()))?;
        let jpeg = encode_rgb_jpeg(&image, config.quality)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        Ok(Frame::new(jpeg, width, height, self.sequence)
            .with_metadata(format!("nokhwa {}x{}", width, height)))
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.requests.send(Request::Close);
            let _ = worker.thread.join();
            tracing::info!("nokhwa camera closed");
        }
        self.config = None;
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        Ok(cameras
            .iter()
            .enumerate()
            .map(|(position, info)| DeviceInfo {
                index: info.index().as_index().unwrap_or(position as u32),
                model: info.human_name(),
                id: info.misc(),
                max_resolution: None,
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "nokhwa"
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.close();
    }
}
