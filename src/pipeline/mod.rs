//! Pipeline stages for document ingestion.
//!
//! Each submodule implements exactly one step. Stages call their capability,
//! time it, write their output into the [`crate::record::DocumentRecord`]
//! and report through the [`crate::tracker::StateTracker`]. Sequencing,
//! retries and error recording across stages live in
//! [`crate::orchestrator`].
//!
//! ## Data Flow
//!
//! ```text
//! landed PDF ──▶ ocr ──▶ (rasterise ▶ reduce) ──▶ extract ──▶ summary
//!                 text      scratch    ≤ N imgs     JSON        text
//! ```
//!
//! 1. [`ocr`]     — OCR capability over the whole file
//! 2. [`scratch`] — per-run directory the rasteriser writes page images into
//! 3. [`reduce`]  — cap page count and base64 payload size
//! 4. [`extract`] — schema-driven extraction, fenced-JSON parsing
//! 5. [`summary`] — summary and classification

pub mod extract;
pub mod ocr;
pub mod reduce;
pub mod scratch;
pub mod summary;
