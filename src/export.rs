//! Single-frame export outside the bundle container.
//!
//! Two interchange forms: a standalone compressed payload (the same
//! bytes a bundle frame file holds), and an ascii PLY point cloud for
//! tooling that wants plain text. The PLY writer and reader agree on an
//! exact header so a read-write cycle reproduces the file byte for byte.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::codec::{CodecError, PointCloudCodec, QualityTier};
use crate::schema::{Point3, PointCloudFrame};

/// Export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Malformed ply header: expected {expected:?}, found {found:?}")]
    MalformedHeader { expected: String, found: String },
    #[error("Malformed vertex line {line}: {reason}")]
    MalformedVertex { line: usize, reason: String },
}

/// Write one frame as a standalone compressed payload file.
///
/// The tier is chosen from the frame's point count, exactly as during
/// recording.
pub fn write_compressed_frame(
    path: &Path,
    codec: &dyn PointCloudCodec,
    frame: &PointCloudFrame,
) -> Result<(), ExportError> {
    let tier = QualityTier::for_point_count(frame.len());
    let bytes = codec.encode(frame, tier)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a standalone compressed payload file back into points.
pub fn read_compressed_frame(
    path: &Path,
    codec: &dyn PointCloudCodec,
) -> Result<Vec<Point3>, ExportError> {
    let bytes = std::fs::read(path)?;
    Ok(codec.decode(&bytes)?)
}

/// Write points as ascii PLY.
pub fn write_ply<W: Write>(w: &mut W, points: &[Point3]) -> std::io::Result<()> {
    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", points.len())?;
    writeln!(w, "property float x")?;
    writeln!(w, "property float y")?;
    writeln!(w, "property float z")?;
    writeln!(w, "end_header")?;
    for p in points {
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    Ok(())
}

/// Read ascii PLY produced by [`write_ply`].
///
/// The header is matched strictly; this is a round-trip format, not a
/// general PLY parser.
pub fn read_ply<R: BufRead>(r: &mut R) -> Result<Vec<Point3>, ExportError> {
    let mut line = String::new();

    for expected in ["ply", "format ascii 1.0"] {
        expect_line(r, &mut line, Some(expected))?;
    }
    let vertex_line = expect_line(r, &mut line, None)?;
    let count: usize = vertex_line
        .strip_prefix("element vertex ")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ExportError::MalformedHeader {
            expected: "element vertex <count>".to_string(),
            found: vertex_line.clone(),
        })?;
    for expected in [
        "property float x",
        "property float y",
        "property float z",
        "end_header",
    ] {
        expect_line(r, &mut line, Some(expected))?;
    }

    let mut points = Vec::with_capacity(count);
    let mut body = String::new();
    for i in 0..count {
        body.clear();
        let read = r.read_line(&mut body)?;
        if read == 0 {
            return Err(ExportError::MalformedVertex {
                line: i,
                reason: "unexpected end of file".to_string(),
            });
        }
        let mut parts = body.split_whitespace();
        let mut coord = |axis: &str| -> Result<f32, ExportError> {
            parts
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| ExportError::MalformedVertex {
                    line: i,
                    reason: format!("missing or unparsable {} coordinate", axis),
                })
        };
        let (x, y, z) = (coord("x")?, coord("y")?, coord("z")?);
        points.push(Point3::new(x, y, z));
    }
    Ok(points)
}

fn expect_line<R: BufRead>(
    r: &mut R,
    line: &mut String,
    expected: Option<&str>,
) -> Result<String, ExportError> {
    line.clear();
    r.read_line(line)?;
    let found = line.trim_end_matches('\n');
    match expected {
        Some(want) if found != want => Err(ExportError::MalformedHeader {
            expected: want.to_string(),
            found: found.to_string(),
        }),
        _ => Ok(found.to_string()),
    }
}

/// [`write_ply`] to a file path.
pub fn write_ply_file(path: &Path, points: &[Point3]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_ply(&mut writer, points)?;
    writer.flush()
}

/// [`read_ply`] from a file path.
pub fn read_ply_file(path: &Path) -> Result<Vec<Point3>, ExportError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_ply(&mut reader)
}
