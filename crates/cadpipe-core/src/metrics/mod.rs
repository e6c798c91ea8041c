//! Geometry metric extraction.
//!
//! Two independent strategies recover quantitative facts about produced
//! geometry, selected per operation:
//! - [`markers`]: fixed-format tagged lines printed to stdout by measurement
//!   statements appended to the submitted script.
//! - [`stl`]: direct decoding of a compiled binary STL mesh file.
//!
//! Every metric is independently present-or-absent; absence means "not
//! measured" and is never an error.

pub mod markers;
pub mod stl;

use serde::Serialize;

/// A point or extent in model space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The three components in axis order.
    pub fn axes(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Axis-aligned bounding box with `size = max - min` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
    pub size: Vec3,
}

impl BoundingBox {
    /// Whether every axis extent is strictly positive.
    pub fn has_positive_volume(&self) -> bool {
        self.size.axes().iter().all(|&axis| axis > 0.0)
    }
}

/// Metrics recovered for one model. Each field is present only if its
/// extraction path succeeded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeometryMetrics {
    pub bounding_box: Option<BoundingBox>,
    pub volume: Option<f64>,
    pub surface_area: Option<f64>,
    pub triangle_count: Option<u32>,
}

/// Round to two decimal places, the fixed reporting precision for decoded
/// mesh coordinates.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
