//! Textual marker extraction.
//!
//! The cadquery orchestrator appends measurement statements that print fixed
//! single-line tags to stdout:
//!
//! ```text
//! BBOX:xmin,ymin,zmin,xmax,ymax,zmax
//! SIZE:XxYxZ
//! VOLUME:v
//! AREA:a
//! ```
//!
//! These regexes and the appended python snippets are one wire format and
//! must not drift independently. A tag is present only if its exact pattern
//! matches; a partial or malformed match yields absent, never a partial
//! object.

use std::sync::LazyLock;

use regex::Regex;

use crate::metrics::{BoundingBox, GeometryMetrics, Vec3};

static BBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"BBOX:([-\d.]+),([-\d.]+),([-\d.]+),([-\d.]+),([-\d.]+),([-\d.]+)")
        .unwrap_or_else(|err| panic!("invalid BBOX pattern: {err}"))
});

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SIZE:([-\d.]+)x([-\d.]+)x([-\d.]+)")
        .unwrap_or_else(|err| panic!("invalid SIZE pattern: {err}"))
});

static VOLUME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"VOLUME:([-\d.]+)").unwrap_or_else(|err| panic!("invalid VOLUME pattern: {err}"))
});

static AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AREA:([-\d.]+)").unwrap_or_else(|err| panic!("invalid AREA pattern: {err}"))
});

fn capture_f64(captures: &regex::Captures<'_>, index: usize) -> Option<f64> {
    captures.get(index)?.as_str().parse().ok()
}

/// Parse the bounding box from BBOX and SIZE tags.
///
/// Present only when both tags match and all nine numbers parse; otherwise
/// absent.
pub fn parse_bounding_box(stdout: &str) -> Option<BoundingBox> {
    let bbox = BBOX_RE.captures(stdout)?;
    let size = SIZE_RE.captures(stdout)?;

    Some(BoundingBox {
        min: Vec3::new(
            capture_f64(&bbox, 1)?,
            capture_f64(&bbox, 2)?,
            capture_f64(&bbox, 3)?,
        ),
        max: Vec3::new(
            capture_f64(&bbox, 4)?,
            capture_f64(&bbox, 5)?,
            capture_f64(&bbox, 6)?,
        ),
        size: Vec3::new(
            capture_f64(&size, 1)?,
            capture_f64(&size, 2)?,
            capture_f64(&size, 3)?,
        ),
    })
}

/// Parse the VOLUME tag.
pub fn parse_volume(stdout: &str) -> Option<f64> {
    let captures = VOLUME_RE.captures(stdout)?;
    capture_f64(&captures, 1)
}

/// Parse the AREA tag.
///
/// A negative value is the engine's own sentinel for "could not be computed"
/// and reports absent.
pub fn parse_surface_area(stdout: &str) -> Option<f64> {
    let captures = AREA_RE.captures(stdout)?;
    let value = capture_f64(&captures, 1)?;
    if value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Extract every marker-borne metric from stdout in one pass.
///
/// The textual strategy never yields a triangle count; that comes only from
/// the binary decoder.
pub fn extract(stdout: &str) -> GeometryMetrics {
    GeometryMetrics {
        bounding_box: parse_bounding_box(stdout),
        volume: parse_volume(stdout),
        surface_area: parse_surface_area(stdout),
        triangle_count: None,
    }
}
