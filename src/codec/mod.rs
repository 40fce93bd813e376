//! Codec module - Frame compression behind a uniform adapter contract.
//!
//! The pipeline treats the point-cloud codec as an opaque capability:
//! `encode` turns a frame into bytes, `decode` turns bytes back into
//! points, and `probe` classifies a payload without decoding it. The
//! shipped implementation is [`QuantizedCodec`]; the capture and playback
//! paths only ever see the [`PointCloudCodec`] trait.

mod quantized;

pub use quantized::*;

use crate::schema::{Point3, PointCloudFrame};

/// Geometry classification reported by [`PointCloudCodec::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    PointCloud,
    Mesh,
    Invalid,
}

/// Compression tier, selected purely from point count.
///
/// Small frames get the highest quantization bit depth (best precision,
/// largest payload); dense frames get the most aggressive quantization so
/// encode keeps up with the capture rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    /// Fewer than 5 000 points.
    Fine,
    /// 5 000 to 19 999 points.
    Balanced,
    /// 20 000 points and up.
    Compact,
}

impl QualityTier {
    /// Point-count threshold below which [`QualityTier::Fine`] applies.
    pub const FINE_LIMIT: usize = 5_000;
    /// Point-count threshold below which [`QualityTier::Balanced`] applies.
    pub const BALANCED_LIMIT: usize = 20_000;

    /// Select the tier for a frame of `count` points.
    pub fn for_point_count(count: usize) -> Self {
        if count < Self::FINE_LIMIT {
            QualityTier::Fine
        } else if count < Self::BALANCED_LIMIT {
            QualityTier::Balanced
        } else {
            QualityTier::Compact
        }
    }

    /// Position quantization bit depth for this tier.
    pub fn quantization_bits(self) -> u8 {
        match self {
            QualityTier::Fine => 14,
            QualityTier::Balanced => 11,
            QualityTier::Compact => 8,
        }
    }
}

/// Uniform encode/decode contract over the external point-cloud codec.
///
/// Implementations are pure transforms: no side effects beyond allocation.
pub trait PointCloudCodec: Send + Sync {
    /// Encode a frame at the given quality tier.
    ///
    /// Fails when the codec cannot represent the frame's attribute layout
    /// (e.g. non-finite position data); a failed encode produces no bytes
    /// and the caller must not persist anything for the frame.
    fn encode(&self, frame: &PointCloudFrame, tier: QualityTier) -> Result<Vec<u8>, CodecError>;

    /// Decode a payload back into points.
    ///
    /// Fails when `probe` would not report [`GeometryKind::PointCloud`]
    /// or the payload is truncated or corrupt. Callers surface this as a
    /// skipped frame, never as an aborted bundle load.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Point3>, CodecError>;

    /// Classify a payload without decoding it.
    fn probe(&self, bytes: &[u8]) -> GeometryKind;

    /// File extension for payloads of this codec, without the dot.
    fn extension(&self) -> &'static str;
}

/// Codec adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Position data contains non-finite values")]
    NonFinitePosition,
    #[error("Payload is not a point cloud (probed as {0:?})")]
    NotAPointCloud(GeometryKind),
    #[error("Unsupported payload version {0}")]
    UnsupportedVersion(u16),
    #[error("Payload truncated: needed {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },
    #[error("Corrupt payload: {0}")]
    Corrupt(String),
}
