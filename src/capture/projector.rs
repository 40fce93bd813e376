//! Depth-grid to point-cloud projection.

use rayon::prelude::*;

use crate::schema::{CameraIntrinsics, DepthGrid, Point3, PointCloudFrame};

/// Unproject a depth grid into a compacted point cloud.
///
/// Every cell with depth `d > 0` yields one point
/// `((u - cx) * d / fx, (v - cy) * d / fy, d)`; invalid cells (zero or
/// negative depth) are skipped without error. An all-invalid grid yields
/// an empty frame, which downstream treats as a valid zero-point capture.
///
/// Rows are projected in parallel and compacted by rayon's ordered
/// reduce, so output order is row-major scan order and every valid cell
/// appears exactly once.
///
/// The intrinsics must already be scaled to the depth grid's resolution
/// (see [`CameraIntrinsics::scaled_to`]).
pub fn project(
    grid: &DepthGrid,
    intrinsics: &CameraIntrinsics,
    frame_index: u64,
    timestamp: f64,
) -> PointCloudFrame {
    if grid.width == 0 || grid.height == 0 {
        return PointCloudFrame::new(frame_index, timestamp, Vec::new());
    }

    let k = *intrinsics;
    let points: Vec<Point3> = grid
        .samples
        .par_chunks(grid.width)
        .enumerate()
        .flat_map_iter(move |(v, row)| {
            row.iter().enumerate().filter_map(move |(u, &d)| {
                if d > 0.0 {
                    Some(Point3::new(
                        (u as f32 - k.cx) * d / k.fx,
                        (v as f32 - k.cy) * d / k.fy,
                        d,
                    ))
                } else {
                    None
                }
            })
        })
        .collect();

    PointCloudFrame::new(frame_index, timestamp, points)
}
