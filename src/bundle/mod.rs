//! Bundle module - The on-disk point-cloud video container.
//!
//! A bundle is a directory named `<prefix>_<yyyyMMdd_HHmmss>.pcv` holding
//! sequentially named compressed frame payloads (`frame_0000.<ext>`,
//! `frame_0001.<ext>`, ...) and a `metadata.json` descriptor written
//! exactly once at finalize. Fixed-width zero padding makes lexicographic
//! file order equal frame emission order, up to the 9999-frame design
//! limit. A bundle without a metadata descriptor was never finalized and
//! is treated as incomplete; the reader falls back to inferring its shape
//! from the payload files present.

mod reader;
mod writer;

pub use reader::*;
pub use writer::*;

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Bundle directory suffix (without the dot).
pub const BUNDLE_SUFFIX: &str = "pcv";

/// Metadata descriptor file name.
pub const METADATA_FILE: &str = "metadata.json";

/// Frame payload file name prefix.
pub const FRAME_PREFIX: &str = "frame_";

/// Highest frame index representable with 4-digit zero padding.
pub const MAX_FRAME_INDEX: u64 = 9_999;

/// `chrono` format string for recording-date stamps (`yyyyMMdd_HHmmss`).
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Finalize-time bundle descriptor, serialized as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Number of frames durably written to the bundle.
    pub frame_count: u64,
    /// Recording start stamp, `yyyyMMdd_HHmmss`.
    pub recording_date: String,
    /// Capture frame rate in frames per second.
    pub frame_rate: f32,
}

/// Payload file name for a frame index, e.g. `frame_0042.qpc`.
pub fn frame_file_name(index: u64, extension: &str) -> String {
    format!("{}{:04}.{}", FRAME_PREFIX, index, extension)
}

/// Bundle directory name for a prefix and recording stamp.
pub fn bundle_dir_name(prefix: &str, stamp: &str) -> String {
    format!("{}_{}.{}", prefix, stamp, BUNDLE_SUFFIX)
}

/// Whether a path looks like a bundle directory, for parent-folder scans.
pub fn is_bundle_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .extension()
            .is_some_and(|ext| ext == BUNDLE_SUFFIX)
}

/// Bundle container errors.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Bundle directory already exists: {0}")]
    AlreadyExists(std::path::PathBuf),
    #[error("Bundle metadata already finalized")]
    AlreadyFinalized,
    #[error("Frame index {0} exceeds the {MAX_FRAME_INDEX}-frame bundle limit")]
    IndexOutOfRange(u64),
    #[error("No playable frames in {0}")]
    NoPlayableFrames(std::path::PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
}
