//! Toolchain configuration.
//!
//! The scratch directory and engine paths are process-wide settings, but they
//! are passed explicitly into each pipeline rather than read from ambient
//! globals. Environment overrides are resolved once in
//! [`EngineConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

/// Default scratch directory for transient scripts and retained outputs.
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp/cadpipe";

/// Wall-clock budget for one CadQuery script execution.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wall-clock budget for one OpenSCAD compile/render.
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Cap on captured stdout+stderr per invocation (10 MiB).
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Configuration shared by both engine pipelines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for transient inputs and retained outputs.
    pub scratch_dir: PathBuf,

    /// Python interpreter used to run CadQuery scripts.
    pub python_path: String,

    /// OpenSCAD compiler binary.
    pub openscad_path: String,

    /// Timeout for CadQuery script execution.
    pub script_timeout: Duration,

    /// Timeout for OpenSCAD invocations.
    pub compile_timeout: Duration,

    /// Maximum captured output bytes per invocation.
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            python_path: "python3".to_string(),
            openscad_path: "openscad".to_string(),
            script_timeout: SCRIPT_TIMEOUT,
            compile_timeout: COMPILE_TIMEOUT,
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

impl EngineConfig {
    /// Build a configuration with `PYTHON_PATH`, `OPENSCAD_PATH`, and
    /// `CADPIPE_SCRATCH_DIR` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(python) = std::env::var("PYTHON_PATH") {
            if !python.is_empty() {
                config.python_path = python;
            }
        }
        if let Ok(openscad) = std::env::var("OPENSCAD_PATH") {
            if !openscad.is_empty() {
                config.openscad_path = openscad;
            }
        }
        if let Ok(dir) = std::env::var("CADPIPE_SCRATCH_DIR") {
            if !dir.is_empty() {
                config.scratch_dir = PathBuf::from(dir);
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.python_path, "python3");
        assert_eq!(config.openscad_path, "openscad");
        assert_eq!(config.script_timeout, Duration::from_secs(60));
        assert_eq!(config.compile_timeout, Duration::from_secs(120));
        assert_eq!(config.max_output_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_default_scratch_dir() {
        let config = EngineConfig::default();
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/cadpipe"));
    }
}
