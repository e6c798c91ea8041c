//! Error types for the pipeline core.
//!
//! Only two conditions abort a pipeline run: the engine executable could not
//! be launched at all, or the transient input could not even be written to
//! disk. Everything else (non-zero exit, timeout, classifier hits, missing
//! output files) degrades into fields of the structured response.

use std::path::PathBuf;

/// Errors produced by the pipeline core.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch engine '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write scratch file {path}: {source}")]
    ScratchWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create scratch directory {path}: {source}")]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, EngineError>;
