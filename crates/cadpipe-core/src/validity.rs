//! Validity evaluation policies.
//!
//! Each engine has its own conjunction of independent checks. The manifold
//! check is a best-effort text heuristic over compiler diagnostics, not a
//! topological proof, so it reports a three-valued status instead of a
//! boolean.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::diagnostics::Diagnostics;
use crate::metrics::BoundingBox;
use crate::runner::ExitStatus;

/// Axis sizes above this (in mm) draw a "large dimension" warning.
const MAX_SANE_DIMENSION: f64 = 500.0;

/// Axis sizes below this (in mm) draw a "very small dimension" warning.
const MIN_SANE_DIMENSION: f64 = 0.5;

/// Outcome of the manifoldness heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManifoldStatus {
    /// No known non-manifold phrasing found in the diagnostics.
    #[serde(rename = "likely-manifold")]
    LikelyManifold,

    /// Diagnostics mention non-manifold or self-intersecting geometry.
    #[serde(rename = "non-manifold")]
    NonManifold,

    /// No compile output to check.
    #[serde(rename = "unknown")]
    Unknown,

    /// The compiled mesh could not be read back for inspection.
    #[serde(rename = "check-failed")]
    CheckFailed,
}

static NON_MANIFOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not.*manifold|self.intersect")
        .unwrap_or_else(|err| panic!("invalid manifold pattern: {err}"))
});

/// Scan compiler stderr for phrasings indicating broken topology.
///
/// Advisory only: accuracy is bounded by what the compiler happens to emit.
pub fn manifold_status(stderr: &str) -> ManifoldStatus {
    if NON_MANIFOLD_RE.is_match(stderr) {
        ManifoldStatus::NonManifold
    } else {
        ManifoldStatus::LikelyManifold
    }
}

/// Interpreted-engine policy: success exit, no classified errors, a
/// recovered bounding box, and strictly positive extent on every axis.
pub fn script_model_valid(
    status: ExitStatus,
    diagnostics: &Diagnostics,
    bounding_box: Option<&BoundingBox>,
) -> bool {
    status.success()
        && diagnostics.is_clean()
        && bounding_box.is_some_and(|bbox| bbox.has_positive_volume())
}

/// Dimension-sanity check for compiled meshes.
///
/// Returns human-readable warnings for any axis outside the sane working
/// range. Zero-sized axes get a distinct flat-geometry message rather than
/// being folded into the "very small" case. An empty result means the
/// dimensions pass.
pub fn dimension_warnings(bounding_box: &BoundingBox) -> Vec<String> {
    let [sx, sy, sz] = bounding_box.size.axes();
    let mut warnings = Vec::new();

    if sx > MAX_SANE_DIMENSION || sy > MAX_SANE_DIMENSION || sz > MAX_SANE_DIMENSION {
        warnings.push(format!(
            "Large dimension detected: {sx}x{sy}x{sz}mm - verify this is intentional"
        ));
    }
    if sx < MIN_SANE_DIMENSION || sy < MIN_SANE_DIMENSION || sz < MIN_SANE_DIMENSION {
        warnings.push(format!(
            "Very small dimension detected: {sx}x{sy}x{sz}mm - may be too small to print"
        ));
    }
    if sx == 0.0 || sy == 0.0 || sz == 0.0 {
        warnings.push("Zero-thickness geometry detected - model may be 2D".to_string());
    }

    warnings
}
