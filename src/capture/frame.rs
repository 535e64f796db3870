//! Frame type representing a captured JPEG still with metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, RgbImage};

/// Leading bytes of every JPEG stream (SOI marker plus the next marker prefix).
pub const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// A single still captured from the camera.
///
/// The payload is always JPEG-encoded; format conversion happens
/// later, at serving time.
#[derive(Clone)]
pub struct Frame {
    /// Encoded JPEG bytes as produced by the backend.
    jpeg: Bytes,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Wall-clock capture time.
    captured_at: DateTime<Utc>,
    /// Monotonic sequence number assigned by the backend.
    sequence: u64,
    /// Backend-specific description of the capture, if any.
    metadata: Option<String>,
}

impl Frame {
    /// Creates a new frame stamped with the current time.
    pub fn new(jpeg: impl Into<Bytes>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            jpeg: jpeg.into(),
            width,
            height,
            captured_at: Utc::now(),
            sequence,
            metadata: None,
        }
    }

    /// Attaches a backend description, carried into the EXIF comment.
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Returns the JPEG payload.
    #[inline]
    pub fn jpeg(&self) -> &Bytes {
        &self.jpeg
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the backend metadata string.
    #[inline]
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// Checks that the payload starts with the JPEG magic number.
    pub fn is_valid(&self) -> bool {
        self.jpeg.starts_with(&JPEG_MAGIC)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .field("jpeg_bytes", &self.jpeg.len())
            .finish()
    }
}

/// Encodes an RGB buffer as baseline JPEG.
pub(crate) fn encode_rgb_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    image.write_with_encoder(encoder)?;
    Ok(jpeg)
}
