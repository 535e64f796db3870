//! EXIF stamping for captured JPEGs.
//!
//! Only the tag selection lives here. `kamadak-exif` serializes the TIFF
//! block and `img-parts` splices it into the JPEG as an APP1 segment,
//! replacing any Exif segment the camera already wrote.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::ImageEXIF;
use std::io::Cursor;
use thiserror::Error;

/// Character-code prefix of an ASCII `UserComment`.
const ASCII_CHARSET: &[u8; 8] = b"ASCII\0\0\0";

/// Errors raised while stamping a JPEG.
#[derive(Debug, Error)]
pub enum ExifError {
    /// The input could not be parsed as a JPEG stream.
    #[error("invalid JPEG stream: {0}")]
    Jpeg(#[from] img_parts::Error),
    /// The tags could not be serialized.
    #[error("failed to encode EXIF block: {0}")]
    Encode(#[from] exif::Error),
}

/// Tags written into every stamped frame.
#[derive(Debug, Clone)]
pub struct ExifTags {
    /// Camera model (`Model`).
    pub model: String,
    /// Capture time (`DateTimeOriginal`).
    pub captured_at: DateTime<Utc>,
    /// Free-form `UserComment`.
    pub comment: String,
}

impl ExifTags {
    fn fields(&self) -> [Field; 3] {
        let mut comment = ASCII_CHARSET.to_vec();
        comment.extend(ascii(&self.comment));
        [
            Field {
                tag: Tag::Model,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![ascii(&self.model)]),
            },
            Field {
                tag: Tag::DateTimeOriginal,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![ascii(
                    &self.captured_at.format("%Y:%m:%d %H:%M:%S").to_string(),
                )]),
            },
            Field {
                tag: Tag::UserComment,
                ifd_num: In::PRIMARY,
                value: Value::Undefined(comment, 0),
            },
        ]
    }
}

/// EXIF strings are 7-bit; anything else becomes `?`.
fn ascii(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Serializes `tags` as a TIFF block, without the `Exif\0\0` header.
pub fn tiff_block(tags: &ExifTags) -> Result<Vec<u8>, ExifError> {
    let fields = tags.fields();
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut out = Cursor::new(Vec::new());
    writer.write(&mut out, true)?;
    Ok(out.into_inner())
}

/// Returns `jpeg` with `tags` as its only Exif segment.
pub fn stamp(jpeg: Bytes, tags: &ExifTags) -> Result<Bytes, ExifError> {
    let mut image = Jpeg::from_bytes(jpeg)?;
    image.set_exif(Some(Bytes::from(tiff_block(tags)?)));
    Ok(image.encoder().bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Camera, CaptureConfig, MockCamera};
    use chrono::TimeZone;
    use img_parts::jpeg::markers;

    fn sample_jpeg() -> Bytes {
        let mut camera = MockCamera::new();
        camera.open(&CaptureConfig::with_dimensions(24, 16)).unwrap();
        camera.capture().unwrap().jpeg().clone()
    }

    fn tags() -> ExifTags {
        ExifTags {
            model: "PiCam2-Service".into(),
            captured_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap(),
            comment: "TS: 2024-05-17T09:30:05+00:00 | Meta: mock #1".into(),
        }
    }

    fn read_tags(jpeg: &[u8]) -> exif::Exif {
        exif::Reader::new()
            .read_from_container(&mut Cursor::new(jpeg))
            .unwrap()
    }

    fn ascii_field(exif: &exif::Exif, tag: Tag) -> Vec<u8> {
        match &exif.get_field(tag, In::PRIMARY).unwrap().value {
            Value::Ascii(parts) => parts[0].clone(),
            other => panic!("unexpected value {:?}", other),
        }
    }

    fn exif_segments(jpeg: Bytes) -> usize {
        Jpeg::from_bytes(jpeg)
            .unwrap()
            .segments()
            .iter()
            .filter(|s| s.marker() == markers::APP1 && s.contents().starts_with(b"Exif\0\0"))
            .count()
    }

    #[test]
    fn test_stamp_writes_selected_tags() {
        let stamped = stamp(sample_jpeg(), &tags()).unwrap();
        let exif = read_tags(&stamped);

        assert_eq!(ascii_field(&exif, Tag::Model), b"PiCam2-Service");
        assert_eq!(
            ascii_field(&exif, Tag::DateTimeOriginal),
            b"2024:05:17 09:30:05"
        );
        match &exif.get_field(Tag::UserComment, In::PRIMARY).unwrap().value {
            Value::Undefined(bytes, _) => {
                assert!(bytes.starts_with(ASCII_CHARSET));
                assert!(bytes.ends_with(b"Meta: mock #1"));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_stamped_jpeg_still_decodes() {
        let stamped = stamp(sample_jpeg(), &tags()).unwrap();
        assert_eq!(&stamped[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&stamped).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 16));
    }

    #[test]
    fn test_restamp_replaces_existing_exif() {
        let once = stamp(sample_jpeg(), &tags()).unwrap();
        let mut second = tags();
        second.model = "Other".into();
        let twice = stamp(once, &second).unwrap();

        assert_eq!(exif_segments(twice.clone()), 1);
        assert_eq!(ascii_field(&read_tags(&twice), Tag::Model), b"Other");
    }

    #[test]
    fn test_non_ascii_comment_is_replaced() {
        let mut tags = tags();
        tags.comment = "Meta: caméra".into();
        let block = tiff_block(&tags).unwrap();
        assert!(block.windows(12).any(|w| w == b"Meta: cam?ra"));
    }

    #[test]
    fn test_rejects_non_jpeg() {
        let result = stamp(Bytes::from_static(b"definitely not a jpeg"), &tags());
        assert!(matches!(result, Err(ExifError::Jpeg(_))));
    }
}
