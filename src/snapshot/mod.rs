//! Serving-side frame handling: EXIF stamping, the frame cache and
//! format conversion.

mod cache;
pub mod exif_stamp;
mod format;

pub use cache::{CachedFrame, FrameCache};
pub use exif_stamp::{ExifError, ExifTags};
pub use format::{FormatError, SnapshotFormat};
