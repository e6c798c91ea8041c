//! End-to-end pipeline orchestrators, one per engine.
//!
//! Every operation follows the same template: write the transient input,
//! optionally append measurement or export statements, invoke the engine,
//! classify diagnostics, extract metrics, evaluate validity where
//! applicable, probe the filesystem for declared outputs, assemble the
//! response, and release transient artifacts only.

pub mod cadquery;
pub mod openscad;

use std::path::Path;

/// Size of a file on disk, or `None` if it did not materialize.
///
/// An engine may exit successfully yet produce no file, e.g. when the
/// generated geometry is empty, so declared outputs are always probed.
pub(crate) async fn probe_file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|meta| meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.stl");
        tokio::fs::write(&path, b"12345").await.unwrap();
        assert_eq!(probe_file_size(&path).await, Some(5));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(probe_file_size(&tmp.path().join("missing")).await, None);
    }
}
