//! Bundle enumeration and decoding.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{BundleError, BundleMetadata, FRAME_PREFIX, METADATA_FILE};
use crate::codec::PointCloudCodec;
use crate::schema::PointCloudFrame;

/// A fully decoded bundle, ready for playback.
#[derive(Debug)]
pub struct LoadedBundle {
    /// Decoded frames in play order. Indices and timestamps are assigned
    /// from play order, so a bundle with gaps (dropped frames) plays as
    /// a contiguous sequence.
    pub frames: Vec<PointCloudFrame>,
    /// Frame rate from metadata, or 1.0 when the descriptor is missing.
    pub frame_rate: f32,
    /// The metadata descriptor, when the bundle was finalized.
    pub metadata: Option<BundleMetadata>,
}

/// Reads a bundle directory: metadata when present, payload enumeration
/// in lexicographic (= temporal) order, per-frame decode with skip.
pub struct BundleReader;

impl BundleReader {
    /// Load and decode every playable frame in `dir`.
    ///
    /// A missing metadata descriptor downgrades to inference (frame count
    /// from the files found, rate 1.0). A payload that fails to read or
    /// decode is logged and excluded; only a bundle with zero playable
    /// frames fails. An unreadable directory is an I/O error.
    pub fn open(dir: &Path, codec: &dyn PointCloudCodec) -> Result<LoadedBundle, BundleError> {
        let metadata = Self::read_metadata(dir);
        let frame_rate = metadata.as_ref().map_or(1.0, |m| m.frame_rate);

        let paths = Self::enumerate_payloads(dir, codec.extension())?;
        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            match Self::decode_payload(path, codec) {
                Some(points) => {
                    let index = frames.len() as u64;
                    let timestamp = index as f64 / frame_rate as f64;
                    frames.push(PointCloudFrame::new(index, timestamp, points));
                }
                None => continue,
            }
        }

        if frames.is_empty() {
            return Err(BundleError::NoPlayableFrames(dir.to_path_buf()));
        }
        if let Some(m) = &metadata
            && m.frame_count != frames.len() as u64
        {
            debug!(
                "bundle {}: metadata says {} frames, {} decoded",
                dir.display(),
                m.frame_count,
                frames.len()
            );
        }

        Ok(LoadedBundle {
            frames,
            frame_rate,
            metadata,
        })
    }

    fn read_metadata(dir: &Path) -> Option<BundleMetadata> {
        let path = dir.join(METADATA_FILE);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(_) => {
                debug!(
                    "bundle {} has no metadata descriptor, inferring shape",
                    dir.display()
                );
                return None;
            }
        };
        match serde_json::from_str::<BundleMetadata>(&json) {
            Ok(metadata) if metadata.frame_rate.is_finite() && metadata.frame_rate > 0.0 => {
                Some(metadata)
            }
            Ok(metadata) => {
                warn!(
                    "ignoring metadata with invalid frame rate {} in {}",
                    metadata.frame_rate,
                    dir.display()
                );
                None
            }
            Err(e) => {
                warn!("ignoring corrupt metadata in {}: {}", dir.display(), e);
                None
            }
        }
    }

    fn enumerate_payloads(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, BundleError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if name.starts_with(FRAME_PREFIX)
                && path.extension().is_some_and(|ext| ext == extension)
            {
                paths.push(path);
            }
        }
        // Fixed-width zero padding makes this temporal order.
        paths.sort();
        Ok(paths)
    }

    fn decode_payload(path: &Path, codec: &dyn PointCloudCodec) -> Option<Vec<crate::schema::Point3>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("skipping unreadable frame {}: {}", path.display(), e);
                return None;
            }
        };
        match codec.decode(&bytes) {
            Ok(points) => Some(points),
            Err(e) => {
                warn!("skipping undecodable frame {}: {}", path.display(), e);
                None
            }
        }
    }
}
