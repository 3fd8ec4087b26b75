//! Extraction stage: schema-driven structured data from OCR text and images.
//!
//! The extraction backend is asked for JSON matching a caller-supplied
//! schema. Models almost always wrap that JSON in a markdown fence, sometimes
//! with a `json` tag, sometimes with chatter before it. [`parse_json_markdown`]
//! accepts the first fenced block or, failing that, the whole answer as bare
//! JSON. Anything else is a [`PipelineError::MalformedExtractionOutput`]:
//! a prompt/schema mismatch the caller has to see, not an empty result.

use crate::capability::{ExtractionBackend, ExtractionRequest};
use crate::error::PipelineError;
use crate::pipeline::reduce::EncodedImage;
use crate::record::{DocumentRecord, Stage};
use crate::tracker::StateTracker;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

/// Name of the optional classification field in extraction output.
pub const CATEGORIZATION_FIELD: &str = "categorization";

/// A parsed extraction answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// The parsed JSON, as returned by the model.
    pub value: Value,
    /// `categorization` if the caller's schema produced one.
    pub categorization: Option<String>,
}

impl ExtractionResult {
    pub fn new(value: Value) -> Self {
        let categorization = match value.get(CATEGORIZATION_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Self {
            value,
            categorization,
        }
    }
}

// Greedy up to the last closing fence, so backticks inside JSON strings
// don't end the block early.
static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*)```").unwrap());

// Truncated answers with no closing fence still parse if the JSON itself is
// complete.
static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*)\z").unwrap());

/// Parse JSON from a model answer, bare or fenced.
///
/// The whole answer is tried as JSON first; only then is a fenced block
/// looked for.
pub fn parse_json_markdown(answer: &str) -> Result<Value, PipelineError> {
    let trimmed = answer.trim();
    let mut error = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let fenced = RE_FENCED
        .captures(trimmed)
        .or_else(|| RE_OPEN_FENCE.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_matches('`').trim());
    if let Some(body) = fenced {
        match serde_json::from_str(body) {
            Ok(value) => return Ok(value),
            Err(e) => error = e,
        }
    }

    Err(PipelineError::MalformedExtractionOutput {
        detail: error.to_string(),
        excerpt: excerpt(trimmed),
    })
}

fn excerpt(s: &str) -> String {
    const MAX: usize = 120;
    match s.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

/// Run the extraction stage.
///
/// Prompt and schema come from the record's `model_input`. On success the
/// parsed object is stored in `extracted_data.gpt_extraction_output` and the
/// stage is reported complete. Backend failures and malformed answers are
/// returned without touching the record.
pub async fn run_extraction(
    backend: &dyn ExtractionBackend,
    tracker: &StateTracker,
    record: &mut DocumentRecord,
    ocr_text: &str,
    images: &[EncodedImage],
) -> Result<ExtractionResult, PipelineError> {
    let start = Instant::now();
    let answer = {
        let input = record.model_input();
        backend
            .extract(ExtractionRequest {
                ocr_text,
                prompt: &input.model_prompt,
                json_schema: &input.example_schema,
                images,
            })
            .await?
    };
    let elapsed = start.elapsed().as_secs_f64();
    debug!("{}: extraction answer {} bytes", record.id(), answer.len());

    let result = ExtractionResult::new(parse_json_markdown(&answer)?);

    record.extracted_data.gpt_extraction_output = result.value.clone();
    tracker
        .report(record, Stage::GptExtractionCompleted, true, Some(elapsed))
        .await?;
    info!(
        "{}: extraction done in {:.2}s with {} images",
        record.id(),
        elapsed,
        images.len()
    );
    Ok(result)
}
