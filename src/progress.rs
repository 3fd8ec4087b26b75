//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::orchestrator::PipelineBuilder::progress_callback`] to receive
//! events as each document moves through its stages. The durable record is
//! the source of truth; these events exist for terminals and dashboards.
//!
//! # Example
//!
//! ```rust
//! use docstage::{PipelineProgressCallback, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl PipelineProgressCallback for FailureCounter {
//!     fn on_stage_error(&self, id: &str, stage: Stage, error: String) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id}: {stage} failed: {error}");
//!     }
//! }
//! ```

use crate::record::Stage;
use std::sync::Arc;

/// Called by the orchestrator as it processes each document.
///
/// Implementations must be `Send + Sync`: batch runs process several
/// documents concurrently, so calls for different ids may interleave.
/// All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once per document, after its record is created.
    fn on_document_start(&self, id: &str) {
        let _ = id;
    }

    /// Called just before a stage's capability is invoked.
    fn on_stage_start(&self, id: &str, stage: Stage) {
        let _ = (id, stage);
    }

    /// Called when a stage reported success.
    fn on_stage_complete(&self, id: &str, stage: Stage, duration_secs: f64) {
        let _ = (id, stage, duration_secs);
    }

    /// Called for every failed stage attempt, including ones that are retried.
    fn on_stage_error(&self, id: &str, stage: Stage, error: String) {
        let _ = (id, stage, error);
    }

    /// Called once per document when the run ends.
    fn on_document_complete(&self, id: &str, success: bool) {
        let _ = (id, success);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type held by the pipeline.
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
