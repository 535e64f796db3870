//! Swap-in-place frame cache.

use crate::capture::Frame;
use crate::snapshot::exif_stamp::{self, ExifTags};
use crate::snapshot::SnapshotFormat;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// `UserComment` metadata used when the backend reports none.
const NO_METADATA: &str = "Cached";

/// A captured frame ready to be served.
///
/// Immutable once built; the cache hands out `Arc` clones so readers keep a
/// consistent frame for as long as they hold it.
#[derive(Clone)]
pub struct CachedFrame {
    jpeg: Bytes,
    tag: String,
    captured_at: DateTime<Utc>,
    sequence: u64,
    width: u32,
    height: u32,
}

impl CachedFrame {
    /// Stamps EXIF tags onto a camera frame.
    ///
    /// If stamping fails the raw camera bytes are served instead.
    pub fn from_frame(frame: Frame, model: &str) -> Self {
        let captured_at = frame.captured_at();
        let tags = ExifTags {
            model: model.to_string(),
            captured_at,
            comment: format!(
                "TS: {} | Meta: {}",
                captured_at.to_rfc3339(),
                frame.metadata().unwrap_or(NO_METADATA)
            ),
        };

        let jpeg = match exif_stamp::stamp(frame.jpeg().clone(), &tags) {
            Ok(stamped) => stamped,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence(), "EXIF stamping failed, serving raw frame");
                frame.jpeg().clone()
            }
        };

        let hash = blake3::hash(&jpeg);
        let tag = hash.to_hex()[..16].to_string();

        Self {
            jpeg,
            tag,
            captured_at,
            sequence: frame.sequence(),
            width: frame.width(),
            height: frame.height(),
        }
    }

    /// Stamped JPEG bytes.
    pub fn jpeg(&self) -> &Bytes {
        &self.jpeg
    }

    /// Content tag derived from the stamped JPEG.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// When the camera produced the frame.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Capture sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Quoted entity tag for this frame served as `format`.
    pub fn etag_for(&self, format: SnapshotFormat) -> String {
        format!("\"{}-{}\"", self.tag, format.extension())
    }

    /// Capture time as an HTTP date.
    pub fn last_modified(&self) -> String {
        self.captured_at
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }
}

impl std::fmt::Debug for CachedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFrame")
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .field("tag", &self.tag)
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Slot {
    frame: Option<Arc<CachedFrame>>,
    stale: bool,
}

/// Holds the most recent frame.
///
/// A frame is stale once it has been handed out through [`take_fresh`]
/// or was stored by a request that already served it.
///
/// [`take_fresh`]: FrameCache::take_fresh
#[derive(Debug, Default)]
pub struct FrameCache {
    slot: Mutex<Slot>,
}

impl FrameCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached frame.
    pub fn store(&self, frame: Arc<CachedFrame>, served: bool) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.frame = Some(frame);
        slot.stale = served;
    }

    /// Most recent frame regardless of staleness.
    pub fn latest(&self) -> Option<Arc<CachedFrame>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .clone()
    }

    /// Returns the frame only if nobody has been served it yet, marking it stale.
    pub fn take_fresh(&self) -> Option<Arc<CachedFrame>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.stale {
            return None;
        }
        let frame = slot.frame.clone()?;
        slot.stale = true;
        Some(frame)
    }

    /// True when the cache is empty or its frame has been served.
    pub fn is_stale(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.frame.is_none() || slot.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Camera, CaptureConfig, MockCamera};

    fn frame() -> Frame {
        let mut camera = MockCamera::new();
        camera.open(&CaptureConfig::with_dimensions(16, 16)).unwrap();
        camera.capture().unwrap()
    }

    #[test]
    fn test_from_frame_stamps_exif() {
        let frame = frame();
        let raw = frame.jpeg().clone();
        let cached = CachedFrame::from_frame(frame, "Test-Model");

        assert!(cached.jpeg().len() > raw.len());
        assert!(cached.jpeg().windows(10).any(|w| w == b"Test-Model"));
        assert_eq!(&cached.jpeg()[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(cached.tag().len(), 16);
        assert_eq!(cached.dimensions(), (16, 16));
    }

    #[test]
    fn test_invalid_frame_falls_back_to_raw() {
        let frame = Frame::new(vec![0u8; 8], 1, 1, 7);
        let cached = CachedFrame::from_frame(frame, "Test-Model");
        assert_eq!(&cached.jpeg()[..], &[0u8; 8]);
        assert_eq!(cached.sequence(), 7);
    }

    #[test]
    fn test_etag_and_last_modified() {
        let cached = CachedFrame::from_frame(frame(), "Test-Model");
        let etag = cached.etag_for(SnapshotFormat::Png);
        assert!(etag.starts_with('"') && etag.ends_with("-png\""));
        assert!(cached.last_modified().ends_with(" GMT"));
    }

    #[test]
    fn test_empty_cache() {
        let cache = FrameCache::new();
        assert!(cache.latest().is_none());
        assert!(cache.take_fresh().is_none());
        assert!(cache.is_stale());
    }

    #[test]
    fn test_take_fresh_once() {
        let cache = FrameCache::new();
        cache.store(Arc::new(CachedFrame::from_frame(frame(), "m")), false);
        assert!(!cache.is_stale());

        assert!(cache.take_fresh().is_some());
        assert!(cache.take_fresh().is_none());
        assert!(cache.is_stale());
        assert!(cache.latest().is_some());
    }

    #[test]
    fn test_store_served_is_stale() {
        let cache = FrameCache::new();
        cache.store(Arc::new(CachedFrame::from_frame(frame(), "m")), true);
        assert!(cache.is_stale());
        assert!(cache.take_fresh().is_none());
    }

    #[test]
    fn test_store_replaces_wholesale() {
        let cache = FrameCache::new();
        let first = Arc::new(CachedFrame::from_frame(frame(), "m"));
        cache.store(Arc::clone(&first), false);

        let held = cache.latest().unwrap();
        let second = Arc::new(CachedFrame::from_frame(Frame::new(vec![1, 2, 3], 1, 1, 99), "m"));
        cache.store(second, false);

        assert_eq!(held.sequence(), first.sequence());
        assert_eq!(cache.latest().unwrap().sequence(), 99);
    }
}
