//! Cloudcast - Point-cloud video capture, bundling and playback.
//!
//! This crate turns a live sequence of depth-camera frames into a
//! compressed, self-describing "point-cloud video" bundle on disk, and
//! plays such bundles back at their recorded frame rate.
//!
//! # Architecture
//!
//! The pipeline is built from five pieces, leaf to root:
//!
//! - `schema`: frame data model and capture configuration
//! - `capture`: depth-grid projection and the recording session
//! - `codec`: the uniform encode/decode adapter over the frame codec
//! - `bundle`: the on-disk container writer and reader
//! - `playback`: timed single-pass playback of a loaded bundle
//!
//! Capture runs on the caller's sensor tick; encoding and persistence
//! happen on a tracked background pool so the tick never blocks. A
//! bundle is only complete once `stop()` drains that pool and writes the
//! metadata descriptor.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudcast::{
//!     CameraIntrinsics, CaptureConfig, CaptureSession, DepthGrid,
//!     PlaybackSession, QuantizedCodec, project,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = Arc::new(QuantizedCodec::new());
//! let mut session = CaptureSession::new(CaptureConfig::default(), codec.clone());
//! session.start()?;
//!
//! // One sensor tick: project a depth grid and hand it to the session.
//! let grid = DepthGrid::new(256, 192, vec![1.0; 256 * 192]);
//! let intrinsics = CameraIntrinsics::new(200.0, 200.0, 128.0, 96.0);
//! session.submit_frame(project(&grid, &intrinsics, 0, 0.0))?;
//!
//! let stats = session.stop()?;
//! println!("recorded: {}", stats);
//!
//! // Play the bundle back once at its recorded rate.
//! let mut playback = PlaybackSession::open(&stats.bundle_dir, codec.as_ref())?;
//! playback.play(|frame| println!("frame {} ({} points)", frame.frame_index, frame.len()))?;
//! playback.wait()?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod capture;
pub mod codec;
pub mod export;
pub mod playback;
pub mod schema;

// Re-export commonly used types
pub use bundle::{BundleMetadata, BundleReader, BundleWriter, LoadedBundle, is_bundle_dir};
pub use capture::{CaptureError, CaptureSession, CaptureStats, project};
pub use codec::{CodecError, GeometryKind, PointCloudCodec, QualityTier, QuantizedCodec};
pub use playback::{PlaybackError, PlaybackSession, PlaybackState};
pub use schema::{
    CameraIntrinsics, CaptureConfig, CompressedFrame, DepthGrid, Point3, PointCloudFrame,
};
