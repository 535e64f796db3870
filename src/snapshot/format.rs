//! Output formats for `/snapshot.<ext>`.
//!
//! The camera always produces JPEG. Other formats are transcoded on request
//! from the cached JPEG.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

/// Errors raised while transcoding a frame.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The cached JPEG could not be decoded.
    #[error("failed to decode captured frame: {0}")]
    Decode(image::ImageError),
    /// The target encoder failed.
    #[error("failed to encode {format}: {source}")]
    Encode {
        /// Target extension.
        format: &'static str,
        /// Encoder error.
        source: image::ImageError,
    },
}

/// Image format a snapshot can be served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotFormat {
    /// `.jpg` / `.jpeg`, served as captured.
    Jpeg,
    /// `.png`
    Png,
    /// `.bmp`
    Bmp,
    /// `.gif`
    Gif,
}

impl SnapshotFormat {
    /// Resolves a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Canonical extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
        }
    }

    /// MIME type for the `Content-Type` header.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
        }
    }

    /// Converts a JPEG into this format.
    ///
    /// JPEG input is returned as-is. For PNG the JPEG `quality` is mapped onto
    /// a compression effort: lower quality means harder compression.
    pub fn encode(self, jpeg: &[u8], quality: u8) -> Result<Vec<u8>, FormatError> {
        let encode_err = |source| FormatError::Encode {
            format: self.extension(),
            source,
        };

        let mut out = Vec::new();
        match self {
            Self::Jpeg => out.extend_from_slice(jpeg),
            Self::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut out,
                    png_compression(quality),
                    FilterType::Adaptive,
                );
                decode(jpeg)?
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            Self::Bmp => {
                DynamicImage::ImageRgb8(decode(jpeg)?.to_rgb8())
                    .write_to(&mut Cursor::new(&mut out), ImageFormat::Bmp)
                    .map_err(encode_err)?;
            }
            Self::Gif => {
                DynamicImage::ImageRgba8(decode(jpeg)?.to_rgba8())
                    .write_to(&mut Cursor::new(&mut out), ImageFormat::Gif)
                    .map_err(encode_err)?;
            }
        }
        Ok(out)
    }
}

fn decode(jpeg: &[u8]) -> Result<DynamicImage, FormatError> {
    image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).map_err(FormatError::Decode)
}

/// Maps JPEG quality 0..=100 onto a zlib-style level 0..=9.
fn png_level(quality: u8) -> u8 {
    (100 - quality.min(100)) / 11
}

fn png_compression(quality: u8) -> CompressionType {
    match png_level(quality) {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Camera, CaptureConfig, MockCamera};

    fn jpeg() -> Vec<u8> {
        let mut camera = MockCamera::new();
        camera.open(&CaptureConfig::with_dimensions(32, 24)).unwrap();
        camera.capture().unwrap().jpeg().to_vec()
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(SnapshotFormat::from_extension("jpg"), Some(SnapshotFormat::Jpeg));
        assert_eq!(SnapshotFormat::from_extension("JPEG"), Some(SnapshotFormat::Jpeg));
        assert_eq!(SnapshotFormat::from_extension("Png"), Some(SnapshotFormat::Png));
        assert_eq!(SnapshotFormat::from_extension("gif"), Some(SnapshotFormat::Gif));
        assert_eq!(SnapshotFormat::from_extension("tiff"), None);
        assert_eq!(SnapshotFormat::from_extension(""), None);
    }

    #[test]
    fn test_jpeg_passthrough() {
        let input = jpeg();
        let out = SnapshotFormat::Jpeg.encode(&input, 90).unwrap();
        assert_eq!(out, input);

        let opaque = SnapshotFormat::Jpeg.encode(b"not decoded", 90).unwrap();
        assert_eq!(opaque, b"not decoded");
    }

    #[test]
    fn test_transcode_signatures() {
        let input = jpeg();

        let png = SnapshotFormat::Png.encode(&input, 90).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let bmp = SnapshotFormat::Bmp.encode(&input, 90).unwrap();
        assert_eq!(&bmp[..2], b"BM");

        let gif = SnapshotFormat::Gif.encode(&input, 90).unwrap();
        assert_eq!(&gif[..3], b"GIF");
    }

    #[test]
    fn test_transcode_keeps_dimensions() {
        let png = SnapshotFormat::Png.encode(&jpeg(), 50).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_png_level_mapping() {
        assert_eq!(png_level(100), 0);
        assert_eq!(png_level(90), 0);
        assert_eq!(png_level(50), 4);
        assert_eq!(png_level(0), 9);
        assert!(matches!(png_compression(95), CompressionType::Fast));
        assert!(matches!(png_compression(10), CompressionType::Best));
    }

    #[test]
    fn test_decode_error() {
        let err = SnapshotFormat::Png.encode(b"not an image", 90).unwrap_err();
        assert!(matches!(err, FormatError::Decode(_)));
    }
}
