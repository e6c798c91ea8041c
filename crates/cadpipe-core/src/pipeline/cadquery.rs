//! CadQuery pipeline: executes python modeling scripts through an external
//! interpreter and recovers metrics via the textual marker protocol.
//!
//! Submitted scripts must bind a `result` variable holding a CadQuery
//! Workplane; the appended measurement and export statements reference it by
//! name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::diagnostics::{cadquery_ruleset, classify, Diagnostics};
use crate::error::{EngineError, Result};
use crate::metrics::markers::{extract, parse_bounding_box, parse_volume};
use crate::metrics::BoundingBox;
use crate::pipeline::probe_file_size;
use crate::runner::{run_engine, ExecutionResult, RunOptions};
use crate::scratch::{ScratchStore, TransientGuard};
use crate::validity::script_model_valid;

/// Measurement statements appended before execution. The printed tags are
/// one wire format with `metrics::markers` and must not drift independently.
const MEASUREMENT_SNIPPET: &str = r#"
_r = result
_bb = _r.val().BoundingBox()
_vol = _r.val().Volume()
print(f"BBOX:{_bb.xmin:.2f},{_bb.ymin:.2f},{_bb.zmin:.2f},{_bb.xmax:.2f},{_bb.ymax:.2f},{_bb.zmax:.2f}")
print(f"SIZE:{_bb.xlen:.2f}x{_bb.ylen:.2f}x{_bb.zlen:.2f}")
print(f"VOLUME:{_vol:.2f}")
"#;

/// Measurement plus surface area; AREA prints -1 when faces cannot be
/// summed, which the extractor treats as absent.
const INFO_SNIPPET: &str = r#"
_r = result
_bb = _r.val().BoundingBox()
_vol = _r.val().Volume()
try:
    _area = sum(f.Area() for f in _r.val().Faces())
except:
    _area = -1
print(f"BBOX:{_bb.xmin:.2f},{_bb.ymin:.2f},{_bb.zmin:.2f},{_bb.xmax:.2f},{_bb.ymax:.2f},{_bb.zmax:.2f}")
print(f"SIZE:{_bb.xlen:.2f}x{_bb.ylen:.2f}x{_bb.zlen:.2f}")
print(f"VOLUME:{_vol:.2f}")
print(f"AREA:{_area:.2f}")
"#;

/// Formats the export operation can produce in a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Step,
    Stl,
    Svg,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Step => "step",
            ExportFormat::Stl => "stl",
            ExportFormat::Svg => "svg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Step => ".step",
            ExportFormat::Stl => ".stl",
            ExportFormat::Svg => ".svg",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "step" => Ok(ExportFormat::Step),
            "stl" => Ok(ExportFormat::Stl),
            "svg" => Ok(ExportFormat::Svg),
            other => Err(format!("unknown export format '{other}' (expected step, stl, or svg)")),
        }
    }
}

/// Response of the execute operation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Response of the validate operation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub bounding_box: Option<BoundingBox>,
    pub volume_mm3: Option<f64>,
}

/// Response of the export operation. `files` holds only the formats whose
/// output actually materialized; partial success is representable.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub files: BTreeMap<String, PathBuf>,
    pub bounding_box: Option<BoundingBox>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stderr: String,
}

/// Response of the preview operation.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub svg_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stderr: String,
}

/// Response of the info operation.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub bounding_box: Option<BoundingBox>,
    pub volume_mm3: Option<f64>,
    pub surface_area_mm2: Option<f64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stderr: String,
}

/// Orchestrates CadQuery script operations.
#[derive(Debug, Clone)]
pub struct CadQueryPipeline {
    config: EngineConfig,
    store: ScratchStore,
}

impl CadQueryPipeline {
    pub fn new(config: EngineConfig) -> Self {
        let store = ScratchStore::new(config.scratch_dir.clone());
        Self { config, store }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            timeout: self.config.script_timeout,
            max_output_bytes: self.config.max_output_bytes,
            needs_display: false,
        }
    }

    /// Write the assembled script as a transient artifact and run it.
    /// The script is registered on `guard` and released when the caller's
    /// guard drops, whatever the outcome.
    async fn run_script(&self, script: &str, guard: &mut TransientGuard) -> Result<ExecutionResult> {
        self.store.ensure_dir().await?;
        let script_path = self.store.allocate("script", ".py");
        guard.track(&script_path);
        tokio::fs::write(&script_path, script)
            .await
            .map_err(|source| EngineError::ScratchWrite {
                path: script_path.clone(),
                source,
            })?;

        let args = vec![script_path.to_string_lossy().to_string()];
        run_engine(&self.config.python_path, &args, &self.run_options()).await
    }

    fn classify(&self, result: &ExecutionResult) -> Diagnostics {
        classify(&result.stderr, cadquery_ruleset())
    }

    /// Run a script as-is and report raw output plus classified diagnostics.
    pub async fn execute(&self, source: &str) -> Result<ExecuteResponse> {
        let mut guard = TransientGuard::new();
        let result = self.run_script(source, &mut guard).await?;
        let diagnostics = self.classify(&result);

        info!(
            status = result.status.code(),
            duration_ms = result.duration_ms,
            "cadquery execute finished"
        );

        Ok(ExecuteResponse {
            success: result.status.success(),
            stdout: result.stdout,
            stderr: result.stderr,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
        })
    }

    /// Run a script with measurement statements appended and evaluate the
    /// script-model validity policy.
    pub async fn validate(&self, source: &str) -> Result<ValidateResponse> {
        let mut guard = TransientGuard::new();
        let script = format!("{source}\n{MEASUREMENT_SNIPPET}");
        let result = self.run_script(&script, &mut guard).await?;

        let diagnostics = self.classify(&result);
        let bounding_box = parse_bounding_box(&result.stdout);
        let volume = parse_volume(&result.stdout);
        let valid = script_model_valid(result.status, &diagnostics, bounding_box.as_ref());

        info!(valid, duration_ms = result.duration_ms, "cadquery validate finished");

        Ok(ValidateResponse {
            valid,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            bounding_box,
            volume_mm3: volume,
        })
    }

    /// Export the model to one or more formats in a single engine pass.
    ///
    /// SVG export is wrapped in the script's own error handling so its
    /// failure cannot abort the other formats; each format is reported only
    /// if its file exists afterwards.
    pub async fn export(
        &self,
        source: &str,
        formats: &[ExportFormat],
        output_dir: Option<&Path>,
    ) -> Result<ExportResponse> {
        self.store.ensure_dir().await?;
        let out_dir = match output_dir {
            Some(dir) => {
                ScratchStore::ensure_dir_at(dir).await?;
                dir.to_path_buf()
            }
            None => self.store.dir().to_path_buf(),
        };

        let out_store = ScratchStore::new(&out_dir);
        let mut declared: Vec<(ExportFormat, PathBuf)> = Vec::new();
        for format in formats {
            declared.push((*format, out_store.allocate("export", format.extension())));
        }

        let mut export_code = String::from("\nimport cadquery as cq\n");
        for (format, path) in &declared {
            let path = path.to_string_lossy();
            match format {
                ExportFormat::Step | ExportFormat::Stl => {
                    export_code.push_str(&format!(
                        "cq.exporters.export(result, \"{path}\")\n"
                    ));
                }
                ExportFormat::Svg => {
                    export_code.push_str("try:\n");
                    export_code.push_str(&format!(
                        "    cq.exporters.export(result, \"{path}\", exportType=\"SVG\")\n"
                    ));
                    export_code.push_str("except Exception as _svg_err:\n");
                    export_code
                        .push_str("    print(f\"SVG_EXPORT_ERROR:{_svg_err}\", flush=True)\n");
                }
            }
        }
        export_code.push_str(MEASUREMENT_SNIPPET);

        let mut guard = TransientGuard::new();
        let script = format!("{source}\n{export_code}");
        let result = self.run_script(&script, &mut guard).await?;

        let diagnostics = self.classify(&result);
        let bounding_box = parse_bounding_box(&result.stdout);
        let success = result.status.success() && diagnostics.is_clean();

        // Probe which declared outputs actually materialized. Exported
        // files are retained for the caller.
        let mut files = BTreeMap::new();
        for (format, path) in declared {
            if probe_file_size(&path).await.is_some() {
                files.insert(format.as_str().to_string(), path);
            }
        }

        info!(
            success,
            exported = files.len(),
            requested = formats.len(),
            "cadquery export finished"
        );

        Ok(ExportResponse {
            success,
            files,
            bounding_box,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            stderr: result.stderr,
        })
    }

    /// Render an SVG preview of the model.
    pub async fn preview(
        &self,
        source: &str,
        output_path: Option<PathBuf>,
    ) -> Result<PreviewResponse> {
        self.store.ensure_dir().await?;
        let svg_path = match output_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    ScratchStore::ensure_dir_at(parent).await?;
                }
                path
            }
            None => self.store.allocate("preview", ".svg"),
        };

        let preview_code = format!(
            "\nimport cadquery as cq\ncq.exporters.export(result, \"{}\", exportType=\"SVG\")\nprint(\"SVG_OK\")\n",
            svg_path.to_string_lossy()
        );

        let mut guard = TransientGuard::new();
        let script = format!("{source}\n{preview_code}");
        let result = self.run_script(&script, &mut guard).await?;

        let diagnostics = self.classify(&result);
        let exists = probe_file_size(&svg_path).await.is_some();
        let success = result.status.success() && diagnostics.is_clean() && exists;

        Ok(PreviewResponse {
            success,
            svg_path: exists.then_some(svg_path),
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            stderr: result.stderr,
        })
    }

    /// Measure the model: bounding box, volume, and surface area.
    pub async fn info(&self, source: &str) -> Result<InfoResponse> {
        let mut guard = TransientGuard::new();
        let script = format!("{source}\n{INFO_SNIPPET}");
        let result = self.run_script(&script, &mut guard).await?;

        let diagnostics = self.classify(&result);
        let metrics = extract(&result.stdout);

        Ok(InfoResponse {
            bounding_box: metrics.bounding_box,
            volume_mm3: metrics.volume,
            surface_area_mm2: metrics.surface_area,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            stderr: result.stderr,
        })
    }
}
