//! Quantized point-cloud payload format.
//!
//! Payload layout (little-endian throughout):
//!
//! ```text
//! Magic(4) "QPCV" | Version(2) | GeometryTag(1) | QuantBits(1) |
//! PointCount(4) | BBoxMin(12) | BBoxMax(12) | Lz4Block(..)
//! ```
//!
//! The LZ4 block (size-prepended) holds `count * 3` u16 components,
//! each position quantized onto a `2^bits - 1` step grid spanning the
//! frame's bounding box. Compression is lossy in coordinate precision,
//! never in point count.

use bytemuck::cast_slice;

use super::{CodecError, GeometryKind, PointCloudCodec, QualityTier};
use crate::schema::{Point3, PointCloudFrame};

/// Magic bytes identifying a quantized point-cloud payload.
pub const PAYLOAD_MAGIC: &[u8; 4] = b"QPCV";

/// Current payload format version.
pub const PAYLOAD_VERSION: u16 = 1;

/// Geometry tag for point-cloud payloads.
pub const GEOMETRY_POINT_CLOUD: u8 = 0;
/// Geometry tag reserved for mesh payloads (not produced by this codec).
pub const GEOMETRY_MESH: u8 = 1;

/// Fixed header size in bytes.
const HEADER_SIZE: usize = 4 + 2 + 1 + 1 + 4 + 12 + 12;

/// Bounding-box quantizing codec with LZ4-compressed component data.
#[derive(Debug, Clone, Default)]
pub struct QuantizedCodec {
    /// When set, overrides the tier's quantization bit depth.
    bits_override: Option<u8>,
}

impl QuantizedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a quantization bit depth regardless of quality tier.
    ///
    /// Panics if `bits` is outside `1..=16` (components are stored as
    /// u16).
    pub fn with_bits(bits: u8) -> Self {
        assert!(
            (1..=16).contains(&bits),
            "quantization bits must be in 1..=16"
        );
        Self {
            bits_override: Some(bits),
        }
    }

    fn bits_for(&self, tier: QualityTier) -> u8 {
        self.bits_override.unwrap_or_else(|| tier.quantization_bits())
    }
}

impl PointCloudCodec for QuantizedCodec {
    fn encode(&self, frame: &PointCloudFrame, tier: QualityTier) -> Result<Vec<u8>, CodecError> {
        if frame.points.iter().any(|p| !p.is_finite()) {
            return Err(CodecError::NonFinitePosition);
        }

        let bits = self.bits_for(tier);
        let steps = ((1u32 << bits) - 1) as f32;
        let (min, max) = bounding_box(&frame.points);
        let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];

        let components: &[f32] = cast_slice(&frame.points);
        let mut quantized = Vec::with_capacity(components.len() * 2);
        for (i, &v) in components.iter().enumerate() {
            let axis = i % 3;
            let q = if extent[axis] > 0.0 {
                ((v - min[axis]) / extent[axis] * steps).round() as u16
            } else {
                0
            };
            quantized.extend_from_slice(&q.to_le_bytes());
        }
        let block = lz4_flex::compress_prepend_size(&quantized);

        let mut out = Vec::with_capacity(HEADER_SIZE + block.len());
        out.extend_from_slice(PAYLOAD_MAGIC);
        out.extend_from_slice(&PAYLOAD_VERSION.to_le_bytes());
        out.push(GEOMETRY_POINT_CLOUD);
        out.push(bits);
        out.extend_from_slice(&(frame.points.len() as u32).to_le_bytes());
        for axis in 0..3 {
            out.extend_from_slice(&min[axis].to_le_bytes());
        }
        for axis in 0..3 {
            out.extend_from_slice(&max[axis].to_le_bytes());
        }
        out.extend_from_slice(&block);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Point3>, CodecError> {
        match self.probe(bytes) {
            GeometryKind::PointCloud => {}
            kind => return Err(CodecError::NotAPointCloud(kind)),
        }
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_SIZE,
                found: bytes.len(),
            });
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != PAYLOAD_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let bits = bytes[7];
        if !(1..=16).contains(&bits) {
            return Err(CodecError::Corrupt(format!(
                "quantization bits {} out of range",
                bits
            )));
        }
        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

        let mut min = [0f32; 3];
        let mut max = [0f32; 3];
        for axis in 0..3 {
            let at = 12 + axis * 4;
            min[axis] = f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
            let at = 24 + axis * 4;
            max[axis] = f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        }

        let quantized = lz4_flex::decompress_size_prepended(&bytes[HEADER_SIZE..])
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;
        let needed = count * 3 * 2;
        if quantized.len() != needed {
            return Err(CodecError::Truncated {
                needed,
                found: quantized.len(),
            });
        }

        let steps = ((1u32 << bits) - 1) as f32;
        let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        let mut points = Vec::with_capacity(count);
        for i in 0..count {
            let mut coords = [0f32; 3];
            for (axis, coord) in coords.iter_mut().enumerate() {
                let at = (i * 3 + axis) * 2;
                let q = u16::from_le_bytes([quantized[at], quantized[at + 1]]) as f32;
                *coord = min[axis] + q / steps * extent[axis];
            }
            points.push(Point3::new(coords[0], coords[1], coords[2]));
        }
        Ok(points)
    }

    fn probe(&self, bytes: &[u8]) -> GeometryKind {
        if bytes.len() < 7 || &bytes[..4] != PAYLOAD_MAGIC {
            return GeometryKind::Invalid;
        }
        match bytes[6] {
            GEOMETRY_POINT_CLOUD => GeometryKind::PointCloud,
            GEOMETRY_MESH => GeometryKind::Mesh,
            _ => GeometryKind::Invalid,
        }
    }

    fn extension(&self) -> &'static str {
        "qpc"
    }
}

fn bounding_box(points: &[Point3]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in points {
        for (axis, v) in [p.x, p.y, p.z].into_iter().enumerate() {
            min[axis] = min[axis].min(v);
            max[axis] = max[axis].max(v);
        }
    }
    if points.is_empty() {
        return ([0.0; 3], [0.0; 3]);
    }
    (min, max)
}
