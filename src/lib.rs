//! Raspberry Pi Camera Snapshot Server
//!
//! Serves still images from a camera over HTTP so laser-cutter software
//! (Lightburn) can fetch `/snapshot.jpg` for workpiece alignment.
//!
//! # Architecture
//!
//! ```text
//! config ──▶ CameraHandle ◀── CaptureScheduler
//!                 │                  │
//!                 ▼                  ▼
//!           SnapshotService ──▶ FrameCache
//!                 │
//!                 ▼
//!           SnapshotServer (/snapshot.<ext>, /set, /camera, ...)
//! ```
//!
//! # Design Principles
//!
//! - **One owner for the hardware**: the camera sits behind [`CameraHandle`],
//!   shared by `Arc`; overlapping captures fail fast with `Busy`
//! - **Readers never wait on hardware**: the cache hands out `Arc` frames
//! - **Capture failures are not fatal**: the previous frame stays cached
//!
//! # Example
//!
//! ```no_run
//! use picam_snapshot::{
//!     capture::{CameraHandle, CaptureConfig, MockCamera},
//!     config::ServeMode,
//!     metrics::MetricsRegistry,
//!     service::SnapshotService,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let camera = CameraHandle::open(Box::new(MockCamera::new()), CaptureConfig::default()).unwrap();
//! let metrics = MetricsRegistry::new().unwrap();
//! let service = SnapshotService::new(Arc::new(camera), Arc::new(metrics), ServeMode::Cached);
//!
//! let frame = service.refresh().await.unwrap();
//! assert_eq!(&frame.jpeg()[..3], &[0xFF, 0xD8, 0xFF]);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod health;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at crate root
pub use capture::{Camera, CameraHandle, CaptureConfig, CaptureError, Frame, MockCamera};
pub use config::{ServeMode, ServiceConfig};
pub use health::{CaptureHealth, HealthMetrics};
pub use scheduler::CaptureScheduler;
pub use server::{SnapshotServer, ServerConfig};
pub use service::{Snapshot, SnapshotService};
pub use snapshot::{CachedFrame, FrameCache, SnapshotFormat};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
