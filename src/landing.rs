//! Landed-file validation.
//!
//! A file delivered to the pipeline must exist, be readable and start with
//! the `%PDF` magic. Checking up front turns a confusing OCR or pdfium
//! failure later on into a clear `file_landed` failure on the record.

use crate::error::PipelineError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated landed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandedFile {
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Validate that `path` is a readable PDF.
pub fn validate(path: &Path) -> Result<LandedFile, PipelineError> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let size = file
        .metadata()
        .map_err(|e| PipelineError::Internal(format!("stat '{}': {e}", path.display())))?
        .len();

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) if &magic == b"%PDF" => {}
        _ => {
            return Err(PipelineError::NotAPdf {
                path: path.to_path_buf(),
                magic,
            })
        }
    }

    debug!("Landed PDF: {} ({} bytes)", path.display(), size);
    Ok(LandedFile {
        path: path.to_path_buf(),
        size,
    })
}

/// Blob name for a local path: forward slashes, no leading `./`.
pub fn blob_name_for(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    s.trim_start_matches("./").to_string()
}
