//! Core frame types: depth grids, camera intrinsics and point clouds.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// A single depth image as produced by one sensor tick.
///
/// Samples are row-major, in meters. A sample of zero (or below) marks an
/// invalid measurement and produces no point during projection.
#[derive(Debug, Clone)]
pub struct DepthGrid {
    /// Grid width in samples (columns).
    pub width: usize,
    /// Grid height in samples (rows).
    pub height: usize,
    /// Row-major depth samples, length `width * height`.
    pub samples: Vec<f32>,
}

impl DepthGrid {
    /// Create a depth grid from row-major samples.
    ///
    /// Panics if `samples.len() != width * height`; mismatched dimensions
    /// are a programming error at the capture boundary, not a runtime
    /// condition.
    pub fn new(width: usize, height: usize, samples: Vec<f32>) -> Self {
        assert_eq!(
            samples.len(),
            width * height,
            "depth grid sample count must equal width * height"
        );
        Self {
            width,
            height,
            samples,
        }
    }

    /// Depth sample at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.samples[row * self.width + col]
    }
}

/// Pinhole camera intrinsics, scaled to the depth grid's resolution.
///
/// Sensors typically report intrinsics for the color image; use
/// [`CameraIntrinsics::scaled_to`] to rescale them before projecting a
/// depth grid of a different resolution. Unscaled color intrinsics applied
/// to a depth grid produce systematically wrong geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length X in pixels.
    pub fx: f32,
    /// Focal length Y in pixels.
    pub fy: f32,
    /// Principal point X in pixels.
    pub cx: f32,
    /// Principal point Y in pixels.
    pub cy: f32,
}

impl CameraIntrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Rescale intrinsics from their reference resolution to the depth
    /// grid's resolution.
    pub fn scaled_to(
        &self,
        depth_width: usize,
        depth_height: usize,
        reference_width: usize,
        reference_height: usize,
    ) -> Self {
        let sx = depth_width as f32 / reference_width as f32;
        let sy = depth_height as f32 / reference_height as f32;
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
        }
    }
}

/// A point in camera space, meters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True when all three coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One captured point cloud, ordered by emission.
///
/// Point order carries no spatial meaning. Frames are immutable after
/// creation; playback hands observers a freshly constructed copy on every
/// tick so reference-change detection keeps working downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudFrame {
    /// Position in the capture sequence, assigned by the session.
    pub frame_index: u64,
    /// Capture timestamp in seconds.
    pub timestamp: f64,
    /// Points in emission order. May be empty; an all-invalid depth grid
    /// is a valid (zero-point) frame.
    pub points: Vec<Point3>,
}

impl PointCloudFrame {
    pub fn new(frame_index: u64, timestamp: f64, points: Vec<Point3>) -> Self {
        Self {
            frame_index,
            timestamp,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A codec-opaque encoded frame, keyed by its capture index.
#[derive(Debug, Clone)]
pub struct CompressedFrame {
    pub frame_index: u64,
    pub bytes: Vec<u8>,
}
