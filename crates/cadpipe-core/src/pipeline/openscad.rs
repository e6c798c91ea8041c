//! OpenSCAD pipeline: compiles OpenSCAD source with the external `openscad`
//! binary and recovers metrics by decoding the compiled binary STL.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::diagnostics::{classify, openscad_ruleset, Diagnostics};
use crate::error::{EngineError, Result};
use crate::metrics::{stl, BoundingBox};
use crate::pipeline::probe_file_size;
use crate::runner::{run_engine, ExecutionResult, RunOptions};
use crate::scratch::{ScratchStore, TransientGuard};
use crate::validity::{dimension_warnings, manifold_status, ManifoldStatus};

/// Default preview image size, `width,height`.
pub const DEFAULT_PREVIEW_SIZE: &str = "800,600";

/// Output formats the compiler can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScadFormat {
    Stl,
    Binstl,
    #[serde(rename = "3mf")]
    ThreeMf,
    Amf,
    Off,
    Dxf,
    Svg,
    Csg,
}

impl ScadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScadFormat::Stl => "stl",
            ScadFormat::Binstl => "binstl",
            ScadFormat::ThreeMf => "3mf",
            ScadFormat::Amf => "amf",
            ScadFormat::Off => "off",
            ScadFormat::Dxf => "dxf",
            ScadFormat::Svg => "svg",
            ScadFormat::Csg => "csg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ScadFormat::Stl | ScadFormat::Binstl => ".stl",
            ScadFormat::ThreeMf => ".3mf",
            ScadFormat::Amf => ".amf",
            ScadFormat::Off => ".off",
            ScadFormat::Dxf => ".dxf",
            ScadFormat::Svg => ".svg",
            ScadFormat::Csg => ".csg",
        }
    }
}

impl std::str::FromStr for ScadFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stl" => Ok(ScadFormat::Stl),
            "binstl" => Ok(ScadFormat::Binstl),
            "3mf" => Ok(ScadFormat::ThreeMf),
            "amf" => Ok(ScadFormat::Amf),
            "off" => Ok(ScadFormat::Off),
            "dxf" => Ok(ScadFormat::Dxf),
            "svg" => Ok(ScadFormat::Svg),
            "csg" => Ok(ScadFormat::Csg),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Response of the render operation.
#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub success: bool,
    pub stl_path: Option<PathBuf>,
    pub file_size_bytes: u64,
    pub bounding_box: Option<BoundingBox>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stderr: String,
}

/// Response of the preview operation.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub png_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub stderr: String,
}

/// Response of the validate operation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub compile_success: bool,
    pub manifold: ManifoldStatus,
    pub triangle_count: u32,
    pub bounding_box: Option<BoundingBox>,
    pub file_size_bytes: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stderr: String,
}

/// Response of the export operation.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub format: ScadFormat,
    pub file_size_bytes: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stderr: String,
}

/// Orchestrates OpenSCAD compile, preview, validate, and export operations.
#[derive(Debug, Clone)]
pub struct OpenscadPipeline {
    config: EngineConfig,
    store: ScratchStore,
}

impl OpenscadPipeline {
    pub fn new(config: EngineConfig) -> Self {
        let store = ScratchStore::new(config.scratch_dir.clone());
        Self { config, store }
    }

    fn run_options(&self, needs_display: bool) -> RunOptions {
        RunOptions {
            timeout: self.config.compile_timeout,
            max_output_bytes: self.config.max_output_bytes,
            needs_display,
        }
    }

    /// Write the source as a transient artifact and invoke the compiler with
    /// `args` followed by the input path.
    async fn run_compiler(
        &self,
        source: &str,
        mut args: Vec<String>,
        needs_display: bool,
        guard: &mut TransientGuard,
    ) -> Result<ExecutionResult> {
        self.store.ensure_dir().await?;
        let input_path = self.store.allocate("model", ".scad");
        guard.track(&input_path);
        tokio::fs::write(&input_path, source)
            .await
            .map_err(|source| EngineError::ScratchWrite {
                path: input_path.clone(),
                source,
            })?;

        args.push(input_path.to_string_lossy().to_string());
        run_engine(
            &self.config.openscad_path,
            &args,
            &self.run_options(needs_display),
        )
        .await
    }

    fn classify(&self, result: &ExecutionResult) -> Diagnostics {
        classify(&result.stderr, openscad_ruleset())
    }

    /// Compile source to a binary STL. The STL is retained for the caller.
    pub async fn render(
        &self,
        source: &str,
        output_path: Option<PathBuf>,
    ) -> Result<RenderResponse> {
        self.store.ensure_dir().await?;
        let stl_path = output_path.unwrap_or_else(|| self.store.allocate("render", ".stl"));

        let args = vec![
            "-o".to_string(),
            stl_path.to_string_lossy().to_string(),
            "--export-format".to_string(),
            "binstl".to_string(),
        ];

        let mut guard = TransientGuard::new();
        let result = self.run_compiler(source, args, false, &mut guard).await?;
        let diagnostics = self.classify(&result);
        let success = result.status.success() && diagnostics.is_clean();

        let mut file_size_bytes = 0;
        let mut bounding_box = None;
        if success {
            if let Some(size) = probe_file_size(&stl_path).await {
                file_size_bytes = size;
                bounding_box = stl::decode_file(&stl_path)
                    .await
                    .map(|summary| summary.bounding_box);
            }
        }

        info!(
            success,
            file_size_bytes,
            duration_ms = result.duration_ms,
            "openscad render finished"
        );

        Ok(RenderResponse {
            success,
            stl_path: success.then_some(stl_path),
            file_size_bytes,
            bounding_box,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            stderr: result.stderr,
        })
    }

    /// Render a PNG preview. Uses the virtual-display shim when the
    /// environment has no display.
    pub async fn preview(
        &self,
        source: &str,
        size: Option<&str>,
        camera: Option<&str>,
        output_path: Option<PathBuf>,
    ) -> Result<PreviewResponse> {
        self.store.ensure_dir().await?;
        let png_path = output_path.unwrap_or_else(|| self.store.allocate("preview", ".png"));

        let mut args = vec![
            "-o".to_string(),
            png_path.to_string_lossy().to_string(),
            "--imgsize".to_string(),
            size.unwrap_or(DEFAULT_PREVIEW_SIZE).to_string(),
        ];
        if let Some(camera) = camera {
            args.push("--camera".to_string());
            args.push(camera.to_string());
        }

        let mut guard = TransientGuard::new();
        let result = self.run_compiler(source, args, true, &mut guard).await?;
        let diagnostics = self.classify(&result);

        let exists = probe_file_size(&png_path).await.is_some();
        let success = result.status.success() && diagnostics.is_clean() && exists;

        Ok(PreviewResponse {
            success,
            png_path: exists.then_some(png_path),
            errors: diagnostics.errors,
            stderr: result.stderr,
        })
    }

    /// Compile to a probe STL and evaluate the compiler validity policy:
    /// compile success, manifoldness heuristic, and dimension sanity. The
    /// probe STL is transient and released with the input.
    pub async fn validate(&self, source: &str) -> Result<ValidateResponse> {
        self.store.ensure_dir().await?;
        let stl_path = self.store.allocate("validate", ".stl");

        let args = vec![
            "-o".to_string(),
            stl_path.to_string_lossy().to_string(),
            "--export-format".to_string(),
            "binstl".to_string(),
        ];

        let mut guard = TransientGuard::new();
        guard.track(&stl_path);
        let result = self.run_compiler(source, args, false, &mut guard).await?;

        let diagnostics = self.classify(&result);
        let compile_success = result.status.success() && diagnostics.is_clean();

        let mut manifold = ManifoldStatus::Unknown;
        let mut triangle_count = 0;
        let mut bounding_box = None;
        let mut file_size_bytes = 0;

        if compile_success {
            match probe_file_size(&stl_path).await {
                Some(size) => {
                    // The heuristic scans compiler phrasings, so a readable
                    // artifact is enough to run it. An empty mesh decodes to
                    // no summary and simply leaves the metrics absent.
                    file_size_bytes = size;
                    manifold = manifold_status(&result.stderr);
                    if let Some(summary) = stl::decode_file(&stl_path).await {
                        triangle_count = summary.triangle_count;
                        bounding_box = Some(summary.bounding_box);
                    }
                }
                None => manifold = ManifoldStatus::CheckFailed,
            }
        }

        // Sanity violations downgrade the verdict without touching the
        // compile step's own success/error reporting.
        let sanity_warnings = bounding_box
            .as_ref()
            .map(dimension_warnings)
            .unwrap_or_default();

        let valid = compile_success
            && manifold == ManifoldStatus::LikelyManifold
            && sanity_warnings.is_empty();

        let mut warnings = diagnostics.warnings;
        warnings.extend(sanity_warnings);

        info!(
            valid,
            compile_success,
            triangle_count,
            duration_ms = result.duration_ms,
            "openscad validate finished"
        );

        Ok(ValidateResponse {
            valid,
            compile_success,
            manifold,
            triangle_count,
            bounding_box,
            file_size_bytes,
            errors: diagnostics.errors,
            warnings,
            stderr: result.stderr,
        })
    }

    /// Export source to the requested format. The output is retained.
    pub async fn export(
        &self,
        source: &str,
        format: ScadFormat,
        output_path: Option<PathBuf>,
    ) -> Result<ExportResponse> {
        self.store.ensure_dir().await?;
        let out_path = output_path.unwrap_or_else(|| self.store.allocate("export", format.extension()));

        let mut args = vec!["-o".to_string(), out_path.to_string_lossy().to_string()];
        if format == ScadFormat::Binstl {
            args.push("--export-format".to_string());
            args.push("binstl".to_string());
        }

        let mut guard = TransientGuard::new();
        let result = self.run_compiler(source, args, false, &mut guard).await?;
        let diagnostics = self.classify(&result);
        let compile_success = result.status.success() && diagnostics.is_clean();

        let probed = if compile_success {
            probe_file_size(&out_path).await
        } else {
            None
        };
        let exists = probed.is_some();
        let file_size_bytes = probed.unwrap_or(0);
        let success = compile_success && exists;

        info!(success, format = format.as_str(), "openscad export finished");

        Ok(ExportResponse {
            success,
            output_path: exists.then_some(out_path),
            format,
            file_size_bytes,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            stderr: result.stderr,
        })
    }
}
