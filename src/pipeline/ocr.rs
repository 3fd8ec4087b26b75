//! OCR stage: one call to the OCR capability, timed.

use crate::capability::{OcrBackend, OcrOutput};
use crate::error::PipelineError;
use crate::record::{DocumentRecord, Stage};
use crate::tracker::StateTracker;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Run OCR on `file` and report `ocr_completed`.
///
/// Invokes the backend exactly once. A backend failure is returned as-is and
/// leaves `ocr_completed` false with no duration; recording the error is the
/// orchestrator's call.
pub async fn run_ocr(
    backend: &dyn OcrBackend,
    tracker: &StateTracker,
    record: &mut DocumentRecord,
    file: &Path,
) -> Result<OcrOutput, PipelineError> {
    let start = Instant::now();
    let output = backend.ocr(file).await?;
    let elapsed = start.elapsed().as_secs_f64();

    record.extracted_data.ocr_output = output.text.clone();
    tracker
        .report(record, Stage::OcrCompleted, true, Some(elapsed))
        .await?;
    info!(
        "{}: OCR done in {:.2}s ({} chars)",
        record.id(),
        elapsed,
        output.text.len()
    );
    Ok(output)
}
