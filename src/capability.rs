//! Capability traits: the external services the pipeline calls through.
//!
//! The pipeline never talks to an OCR service, a language model or a PDF
//! renderer directly. Each one sits behind a trait so deployments can plug in
//! their own backends and tests can substitute deterministic fakes. The
//! crate ships implementations in [`crate::backend`].
//!
//! Implementations report failures as
//! [`PipelineError::CapabilityUnavailable`] (or, for rasterisation,
//! [`PipelineError::RasterisationFailed`]) and must not retry internally;
//! retry policy belongs to the orchestrator.

use crate::error::PipelineError;
use crate::pipeline::extract::ExtractionResult;
use crate::pipeline::reduce::EncodedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Text recognised in a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Full document text in reading order.
    pub text: String,
    /// Backend-specific payload (layout, confidences, per-page output).
    pub raw: Value,
}

/// Optical character recognition over a whole document.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn ocr(&self, file: &Path) -> Result<OcrOutput, PipelineError>;
}

/// PDF page rasterisation into image files.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page of `pdf` into `scratch`, one file per page.
    ///
    /// The returned paths are in page order.
    async fn rasterize(&self, pdf: &Path, scratch: &Path) -> Result<Vec<PathBuf>, PipelineError>;
}

/// Inputs to a structured-extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub ocr_text: &'a str,
    pub prompt: &'a str,
    pub json_schema: &'a str,
    /// Page images in page order; may be empty.
    pub images: &'a [EncodedImage],
}

/// Schema-driven structured extraction.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Return the model's raw answer: JSON, usually inside a markdown fence.
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<String, PipelineError>;
}

/// A summary of an extraction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub text: String,
    /// Some backends classify while summarising.
    pub classification: Option<String>,
}

/// Natural-language summarisation of an extraction result.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn summarize(&self, extraction: &ExtractionResult) -> Result<SummaryOutput, PipelineError>;
}
