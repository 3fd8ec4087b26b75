//! The per-document record: the durable source of truth for pipeline progress.
//!
//! One [`DocumentRecord`] exists per landed file, keyed by an id derived from
//! the file's blob name. It serialises into five nested groups whose field
//! names match documents already written by earlier deployments:
//!
//! ```text
//! {
//!   "id": "inbox__invoice.pdf",
//!   "properties":     { blob_name, blob_size, request_timestamp },
//!   "state":          { file_landed, ocr_completed, ocr_completed_time_seconds, … },
//!   "extracted_data": { classification, accuracy, ocr_output,
//!                       gpt_extraction_output, gpt_summary_output },
//!   "model_input":    { model_deployment, model_prompt, example_schema },
//!   "errors":         [ "…" ]
//! }
//! ```
//!
//! Identity, properties and model input are fixed at creation and only
//! readable afterwards. Stage flags change only through
//! [`DocumentRecord::set_stage`], and errors only ever grow.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Classification stored until a summary run finds a real one.
pub const UNKNOWN_CLASSIFICATION: &str = "N/A";

/// Derive the storage id for a blob name.
///
/// Path separators (`/` and `\`) become `__`, so the id is a flat,
/// storage-key-safe string. Pure function of the name.
///
/// The mapping is not injective: `a/b.pdf`, `a\b.pdf` and `a__b.pdf` all map
/// to `a__b.pdf` and therefore share one record. Ids of existing stored
/// records depend on this exact mapping.
pub fn record_id(blob_name: &str) -> String {
    blob_name.replace(['/', '\\'], "__")
}

/// A tracked pipeline stage, named after its flag in the `state` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FileLanded,
    OcrCompleted,
    GptExtractionCompleted,
    GptSummaryCompleted,
    ProcessingCompleted,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::FileLanded,
        Stage::OcrCompleted,
        Stage::GptExtractionCompleted,
        Stage::GptSummaryCompleted,
        Stage::ProcessingCompleted,
    ];

    /// The flag name in the persisted `state` group.
    pub fn flag_name(self) -> &'static str {
        match self {
            Stage::FileLanded => "file_landed",
            Stage::OcrCompleted => "ocr_completed",
            Stage::GptExtractionCompleted => "gpt_extraction_completed",
            Stage::GptSummaryCompleted => "gpt_summary_completed",
            Stage::ProcessingCompleted => "processing_completed",
        }
    }

    /// Prefix of the error string appended when this stage fails.
    pub fn error_prefix(self) -> &'static str {
        match self {
            Stage::FileLanded => "File landing error",
            Stage::OcrCompleted => "OCR error",
            Stage::GptExtractionCompleted => "GPT extraction error",
            Stage::GptSummaryCompleted => "NL processing error",
            Stage::ProcessingCompleted => "Processing error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag_name())
    }
}

/// Immutable facts about the landed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub blob_name: String,
    pub blob_size: u64,
    /// Written as RFC 3339. Offset-less timestamps from older records are
    /// read as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub request_timestamp: DateTime<Utc>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| de::Error::custom(format!("invalid request_timestamp '{raw}': {e}")))
}

/// Stage flags and their durations in seconds.
///
/// A duration is present only once its stage has reported a result that
/// carried one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub file_landed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_landed_time_seconds: Option<f64>,
    #[serde(default)]
    pub ocr_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_completed_time_seconds: Option<f64>,
    #[serde(default)]
    pub gpt_extraction_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_extraction_completed_time_seconds: Option<f64>,
    #[serde(default)]
    pub gpt_summary_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_summary_completed_time_seconds: Option<f64>,
    #[serde(default)]
    pub processing_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_completed_time_seconds: Option<f64>,
}

impl State {
    fn slot_mut(&mut self, stage: Stage) -> (&mut bool, &mut Option<f64>) {
        match stage {
            Stage::FileLanded => (&mut self.file_landed, &mut self.file_landed_time_seconds),
            Stage::OcrCompleted => (&mut self.ocr_completed, &mut self.ocr_completed_time_seconds),
            Stage::GptExtractionCompleted => (
                &mut self.gpt_extraction_completed,
                &mut self.gpt_extraction_completed_time_seconds,
            ),
            Stage::GptSummaryCompleted => (
                &mut self.gpt_summary_completed,
                &mut self.gpt_summary_completed_time_seconds,
            ),
            Stage::ProcessingCompleted => (
                &mut self.processing_completed,
                &mut self.processing_completed_time_seconds,
            ),
        }
    }

    /// Whether `stage` last reported success.
    pub fn is_complete(&self, stage: Stage) -> bool {
        match stage {
            Stage::FileLanded => self.file_landed,
            Stage::OcrCompleted => self.ocr_completed,
            Stage::GptExtractionCompleted => self.gpt_extraction_completed,
            Stage::GptSummaryCompleted => self.gpt_summary_completed,
            Stage::ProcessingCompleted => self.processing_completed,
        }
    }

    /// Duration recorded for `stage`, if any.
    pub fn duration(&self, stage: Stage) -> Option<f64> {
        match stage {
            Stage::FileLanded => self.file_landed_time_seconds,
            Stage::OcrCompleted => self.ocr_completed_time_seconds,
            Stage::GptExtractionCompleted => self.gpt_extraction_completed_time_seconds,
            Stage::GptSummaryCompleted => self.gpt_summary_completed_time_seconds,
            Stage::ProcessingCompleted => self.processing_completed_time_seconds,
        }
    }
}

/// Everything the pipeline produced for the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub classification: String,
    /// Placeholder; nothing scores extractions yet.
    pub accuracy: f64,
    pub ocr_output: String,
    pub gpt_extraction_output: Value,
    pub gpt_summary_output: String,
}

impl Default for ExtractedData {
    fn default() -> Self {
        Self {
            classification: UNKNOWN_CLASSIFICATION.to_string(),
            accuracy: 0.0,
            ocr_output: String::new(),
            gpt_extraction_output: Value::Object(Default::default()),
            gpt_summary_output: String::new(),
        }
    }
}

/// The model settings a run used, kept for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    pub model_deployment: Option<String>,
    pub model_prompt: String,
    pub example_schema: String,
}

/// Durable per-document state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    id: String,
    properties: Properties,
    state: State,
    pub extracted_data: ExtractedData,
    model_input: ModelInput,
    #[serde(default)]
    errors: Vec<String>,
}

impl DocumentRecord {
    /// Create a fresh record: every flag false, no errors.
    pub fn new(
        blob_name: impl Into<String>,
        blob_size: u64,
        prompt: impl Into<String>,
        json_schema: impl Into<String>,
        model_deployment: Option<String>,
        request_timestamp: DateTime<Utc>,
    ) -> Self {
        let blob_name = blob_name.into();
        Self {
            id: record_id(&blob_name),
            properties: Properties {
                blob_name,
                blob_size,
                request_timestamp,
            },
            state: State::default(),
            extracted_data: ExtractedData::default(),
            model_input: ModelInput {
                model_deployment,
                model_prompt: prompt.into(),
                example_schema: json_schema.into(),
            },
            errors: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn model_input(&self) -> &ModelInput {
        &self.model_input
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Set a stage flag and, when given, its duration.
    ///
    /// A failure without a duration leaves any earlier duration untouched.
    pub fn set_stage(&mut self, stage: Stage, success: bool, duration_secs: Option<f64>) {
        let (flag, duration) = self.state.slot_mut(stage);
        *flag = success;
        if let Some(secs) = duration_secs {
            *duration = Some(secs);
        }
    }

    /// Append an error prefixed with the stage's label.
    pub fn push_stage_error(&mut self, stage: Stage, detail: impl fmt::Display) {
        self.errors.push(format!("{}: {}", stage.error_prefix(), detail));
    }

    /// Append a free-form error that belongs to no single stage.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Whether every stage through processing completed.
    pub fn is_complete(&self) -> bool {
        self.state.processing_completed
    }
}
