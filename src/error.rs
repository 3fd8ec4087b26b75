//! Error types for the docstage library.
//!
//! A single [`PipelineError`] enum covers every failure the pipeline can
//! propagate. Variants fall into four families:
//!
//! * **Capability** — an external backend (OCR, extraction, summarisation)
//!   failed or was unreachable. The only transient family; the orchestrator
//!   may retry these.
//! * **Malformed output** — the extraction model answered, but not with the
//!   JSON-in-markdown shape we asked for. Never retried, never defaulted.
//! * **Persistence** — the document store rejected an upsert. The in-memory
//!   record still carries the update; the caller can re-persist it.
//! * **Input / local** — the landed file is unusable, rasterisation failed,
//!   scratch space could not be created, or the configuration is invalid.
//!
//! A missing optional field (for instance `categorization` in a caller-owned
//! schema) is deliberately *not* represented here: it is logged at warning
//! level and defaulted where it is read.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The external service a [`PipelineError::CapabilityUnavailable`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Ocr,
    Rasterization,
    Extraction,
    Summarization,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Ocr => "OCR",
            Capability::Rasterization => "rasterization",
            Capability::Extraction => "extraction",
            Capability::Summarization => "summarization",
        })
    }
}

/// All errors propagated by the docstage library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Capability errors ─────────────────────────────────────────────────
    /// An external backend was unreachable or returned an error.
    #[error("{capability} capability unavailable: {message}")]
    CapabilityUnavailable {
        capability: Capability,
        message: String,
    },

    /// The extraction response was not JSON, fenced or bare.
    #[error("Malformed extraction output: {detail}\nResponse began with: {excerpt:?}")]
    MalformedExtractionOutput { detail: String, excerpt: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// The document store failed to upsert the record.
    #[error("Failed to persist document '{id}': {message}")]
    PersistenceFailure { id: String, message: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Landed file was not found at the given path.
    #[error("Landed file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the landed file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The landed file is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// pdfium could not open the document or render a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Local resources ───────────────────────────────────────────────────
    /// Scratch directory or scratch image I/O failed.
    #[error("Scratch I/O failed at '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::CapabilityUnavailable`].
    pub fn capability(capability: Capability, message: impl fmt::Display) -> Self {
        Self::CapabilityUnavailable {
            capability,
            message: message.to_string(),
        }
    }

    /// Whether re-invoking the failed stage could succeed.
    ///
    /// Only backend failures qualify. A malformed extraction points at a
    /// prompt/schema mismatch, and persistence failures are retried through
    /// [`crate::tracker::StateTracker::persist`] rather than by redoing work.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::CapabilityUnavailable { .. })
    }
}
