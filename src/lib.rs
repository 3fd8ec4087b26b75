//! # docstage
//!
//! Staged document ingestion with durable per-document state.
//!
//! A landed PDF is OCR'd, structured data is extracted from it by a language
//! model against a caller-supplied JSON schema, the result is summarised, and
//! every stage's outcome is persisted as it happens. The stored
//! [`DocumentRecord`] always reflects true progress: a run that dies halfway
//! leaves a record showing which stages finished, how long they took and
//! what went wrong.
//!
//! ## Pipeline Overview
//!
//! ```text
//! landed PDF
//!  │
//!  ├─ 1. Land     validate file, create record          → file_landed
//!  ├─ 2. OCR      OcrBackend                            → ocr_completed
//!  ├─ 3. Images   rasterise into scratch, reduce to budget
//!  ├─ 4. Extract  ExtractionBackend + fenced-JSON parse → gpt_extraction_completed
//!  ├─ 5. Summary  SummaryBackend + classification       → gpt_summary_completed
//!  └─ 6. Done                                           → processing_completed
//! ```
//!
//! Every external service sits behind a trait in [`capability`]; the crate
//! ships pdfium and `edgequake-llm` implementations in [`backend`], and a
//! directory-backed [`JsonFileStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docstage::{DocumentRequest, JsonFileStore, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().model_deployment("gpt-4o").build()?;
//!     let store = Arc::new(JsonFileStore::open("records").await?);
//!     let pipeline = Pipeline::llm_builder(config, store)?.build()?;
//!
//!     let request = DocumentRequest::new(
//!         "inbox/invoice.pdf",
//!         "Extract the invoice header and line items.",
//!         r#"{"invoice_number": "", "total": 0, "categorization": ""}"#,
//!     );
//!     let run = pipeline.run(request).await;
//!     println!("{}", serde_json::to_string_pretty(&run.record)?);
//!     run.into_result()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docstage` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod capability;
pub mod config;
pub mod error;
pub mod landing;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;
pub mod tracker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::{
    ExtractionBackend, ExtractionRequest, OcrBackend, OcrOutput, Rasterizer, SummaryBackend,
    SummaryOutput,
};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{Capability, PipelineError};
pub use orchestrator::{DocumentRequest, Pipeline, PipelineBuilder, PipelineRun};
pub use pipeline::extract::{parse_json_markdown, ExtractionResult};
pub use pipeline::reduce::{reduce_to_budget, EncodedImage};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use record::{record_id, DocumentRecord, Stage, UNKNOWN_CLASSIFICATION};
pub use store::{DocumentStore, JsonFileStore, MemoryStore};
pub use tracker::StateTracker;
