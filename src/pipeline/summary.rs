//! Summary stage: natural-language summary plus classification.
//!
//! The classification comes from the extraction's `categorization` field when
//! the caller's schema has one, else from the summary backend, else
//! [`UNKNOWN_CLASSIFICATION`]. It is written to the record before the backend
//! is called, so a failed summary still leaves it in place.
//!
//! Unlike OCR and extraction, this stage records its own failure: it appends
//! `NL processing error: …`, reports `gpt_summary_completed = false`, and then
//! returns the error.

use crate::capability::{SummaryBackend, SummaryOutput};
use crate::error::PipelineError;
use crate::pipeline::extract::{ExtractionResult, CATEGORIZATION_FIELD};
use crate::record::{DocumentRecord, Stage, UNKNOWN_CLASSIFICATION};
use crate::tracker::StateTracker;
use std::time::Instant;
use tracing::{info, warn};

/// Run the summary stage over a parsed extraction.
pub async fn run_summary(
    backend: &dyn SummaryBackend,
    tracker: &StateTracker,
    record: &mut DocumentRecord,
    extraction: &ExtractionResult,
) -> Result<SummaryOutput, PipelineError> {
    let from_schema = extraction.categorization.clone();
    if from_schema.is_none() {
        warn!(
            "{}: no '{}' in extraction output, classification stays {}",
            record.id(),
            CATEGORIZATION_FIELD,
            UNKNOWN_CLASSIFICATION
        );
    }
    record.extracted_data.classification = from_schema
        .clone()
        .unwrap_or_else(|| UNKNOWN_CLASSIFICATION.to_string());

    let start = Instant::now();
    let summary = match backend.summarize(extraction).await {
        Ok(s) => s,
        Err(e) => {
            record.push_stage_error(Stage::GptSummaryCompleted, &e);
            tracker
                .report(record, Stage::GptSummaryCompleted, false, None)
                .await?;
            return Err(e);
        }
    };
    let elapsed = start.elapsed().as_secs_f64();

    if from_schema.is_none() {
        if let Some(label) = summary.classification.as_deref().filter(|l| !l.trim().is_empty()) {
            record.extracted_data.classification = label.to_string();
        }
    }
    record.extracted_data.gpt_summary_output = summary.text.clone();
    tracker
        .report(record, Stage::GptSummaryCompleted, true, Some(elapsed))
        .await?;
    info!(
        "{}: summary done in {:.2}s, classification {}",
        record.id(),
        elapsed,
        record.extracted_data.classification
    );
    Ok(summary)
}
