//! cadpipe core - CAD toolchain execution and validation
//!
//! Drives two external CAD engines as subprocesses and turns their console
//! output and binary artifacts into structured facts about a 3D model:
//! - CadQuery scripts executed through a python interpreter
//! - OpenSCAD source compiled by the `openscad` binary
//!
//! The pipelines answer: did it compile, is the geometry sane, what are its
//! bounding box, volume, surface area, and triangle count.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod scratch;
pub mod validity;

// Re-export key types
pub use config::EngineConfig;
pub use diagnostics::{cadquery_ruleset, classify, openscad_ruleset, Diagnostics, Ruleset};
pub use error::{EngineError, Result};
pub use metrics::{BoundingBox, GeometryMetrics, Vec3};
pub use pipeline::cadquery::CadQueryPipeline;
pub use pipeline::openscad::OpenscadPipeline;
pub use runner::{run_engine, ExecutionResult, ExitStatus, RunOptions};
pub use scratch::{ScratchStore, TransientGuard};
pub use validity::ManifoldStatus;
