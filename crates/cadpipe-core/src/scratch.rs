//! Scratch directory management.
//!
//! Allocates collision-free temporary paths for engine inputs and outputs.
//! Transient inputs (generated scripts) are deleted after every pipeline run
//! via [`TransientGuard`]; retained outputs (exported models, previews) are
//! left on disk for the caller.
//!
//! The store never inspects file contents, and cleanup failures never fail
//! the caller's primary operation.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Allocates and releases files in a scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    dir: PathBuf,
}

impl ScratchStore {
    /// Create a store rooted at `dir`. Does not touch the filesystem.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The scratch directory root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the scratch directory (and parents) if absent. Idempotent.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| EngineError::ScratchDir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Create an arbitrary directory (and parents) if absent. Idempotent.
    pub async fn ensure_dir_at(path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| EngineError::ScratchDir {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Allocate a collision-free path `<dir>/<prefix>_<token><ext>`.
    ///
    /// The token is a random UUID, so concurrent requests never collide.
    /// The file itself is not created.
    pub fn allocate(&self, prefix: &str, ext: &str) -> PathBuf {
        let token = Uuid::new_v4().simple();
        self.dir.join(format!("{prefix}_{token}{ext}"))
    }

    /// Best-effort delete of transient files.
    ///
    /// A missing file is treated as already released. Any other failure is
    /// logged and swallowed: cleanup must never fail the primary operation.
    pub async fn release_transient(paths: &[PathBuf]) {
        for path in paths {
            if let Err(err) = tokio::fs::remove_file(path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %err, "transient cleanup failed");
                }
            }
        }
    }
}

/// Guard that deletes registered transient paths when dropped.
///
/// Dropping covers every exit path of a pipeline run, including early `?`
/// returns, so transient inputs can never leak.
#[derive(Debug, Default)]
pub struct TransientGuard {
    paths: Vec<PathBuf>,
}

impl TransientGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for deletion on drop.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Remove a path from the guard so it survives the run.
    pub fn keep(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }
}

impl Drop for TransientGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %err, "transient cleanup failed");
                }
            }
        }
    }
}
