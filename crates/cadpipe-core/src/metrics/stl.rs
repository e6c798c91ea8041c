//! Binary STL decoding.
//!
//! Layout: 80-byte arbitrary header, 4-byte little-endian triangle count,
//! then 50 bytes per triangle (12-byte normal vector, ignored, followed by
//! three vertices of three little-endian f32 each, plus a 2-byte attribute
//! field). Bit-exact: any deviation decodes to absent, never an error.
//!
//! This decoder is the sole source of a reported triangle count and feeds
//! the dimension-sanity heuristics.

use std::path::Path;

use crate::metrics::{round2, BoundingBox, Vec3};

/// Byte offset of the triangle count field.
const HEADER_LEN: usize = 80;

/// Minimum decodable file: header plus triangle count.
const MIN_LEN: usize = HEADER_LEN + 4;

/// Bytes per triangle record.
const TRIANGLE_LEN: usize = 50;

/// Decoded mesh summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSummary {
    /// Triangle count from the 4-byte header field.
    pub triangle_count: u32,

    /// Bounding box over every vertex, rounded to two decimals.
    pub bounding_box: BoundingBox,
}

fn read_f32_le(data: &[u8], offset: usize) -> Option<f32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(f32::from_le_bytes(bytes))
}

/// Decode a binary STL buffer into a mesh summary.
///
/// A buffer shorter than the minimum header, a zero triangle count, or a
/// triangle region truncated short of the declared count all yield `None`.
pub fn decode(data: &[u8]) -> Option<MeshSummary> {
    if data.len() < MIN_LEN {
        return None;
    }
    let count_bytes: [u8; 4] = data.get(HEADER_LEN..MIN_LEN)?.try_into().ok()?;
    let triangle_count = u32::from_le_bytes(count_bytes);
    if triangle_count == 0 {
        return None;
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];

    for i in 0..triangle_count as usize {
        let triangle = MIN_LEN + i * TRIANGLE_LEN;
        // Skip the 12-byte normal; three vertices of 12 bytes follow.
        for v in 0..3 {
            let vertex = triangle + 12 + v * 12;
            let x = read_f32_le(data, vertex)? as f64;
            let y = read_f32_le(data, vertex + 4)? as f64;
            let z = read_f32_le(data, vertex + 8)? as f64;
            for (axis, value) in [x, y, z].into_iter().enumerate() {
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
        }
    }

    let bounding_box = BoundingBox {
        min: Vec3::new(round2(min[0]), round2(min[1]), round2(min[2])),
        max: Vec3::new(round2(max[0]), round2(max[1]), round2(max[2])),
        size: Vec3::new(
            round2(max[0] - min[0]),
            round2(max[1] - min[1]),
            round2(max[2] - min[2]),
        ),
    };

    Some(MeshSummary {
        triangle_count,
        bounding_box,
    })
}

/// Read and decode a binary STL file. A missing or undecodable file yields
/// `None`.
pub async fn decode_file(path: &Path) -> Option<MeshSummary> {
    let data = tokio::fs::read(path).await.ok()?;
    decode(&data)
}
