//! Per-run scratch space for rasterised pages.
//!
//! Each document run gets its own temporary directory, created just before
//! rasterisation and removed right after extraction whatever the outcome.
//! Concurrent runs therefore never see each other's page files. Removal is
//! best-effort: a failure is logged and never fails the run. If a run
//! unwinds before [`ScratchDir::cleanup`] is reached, dropping the inner
//! [`TempDir`] still removes the directory.

use crate::error::PipelineError;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

/// A scoped scratch directory owned by one document run.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under the system temp location.
    pub fn create(label: &str) -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("docstage-{}-", sanitize(label)))
            .tempdir()
            .map_err(|source| PipelineError::Scratch {
                path: std::env::temp_dir(),
                source,
            })?;
        debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create a fresh directory inside `parent`.
    pub fn create_in(parent: &Path, label: &str) -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("docstage-{}-", sanitize(label)))
            .tempdir_in(parent)
            .map_err(|source| PipelineError::Scratch {
                path: parent.to_path_buf(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything in it, logging any failure.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed scratch directory {}", path.display()),
            Err(e) => warn!("Could not remove scratch directory {}: {}", path.display(), e),
        }
    }
}

/// Keep prefixes short and filesystem-safe.
fn sanitize(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .take(32)
        .collect()
}
