//! Pipeline orchestration: one document from landing to terminal state.
//!
//! ```text
//! create record ─▶ land ─▶ OCR ─▶ rasterise+reduce ─▶ extract ─▶ summary ─▶ done
//!       │            │       │            │               │          │
//!       └────────────┴───────┴── upsert after every step ─┴──────────┘
//! ```
//!
//! The orchestrator owns the [`DocumentRecord`] for the whole run and is its
//! only writer, which is what makes whole-record upserts safe. For every
//! failed stage attempt it appends an error and reports the flag false
//! *before* retrying or giving up, so the stored record always shows how far
//! processing got. Work from completed stages is never rolled back.
//!
//! Only [`PipelineError::is_transient`] failures are retried, up to
//! [`PipelineConfig::max_stage_retries`] times with exponential backoff.
//! A persistence failure stops the run immediately: the stage finished, but
//! its result is not durable, and the caller decides whether to
//! [`StateTracker::persist`] the returned record again.

use crate::backend::{llm, render::PdfiumRasterizer};
use crate::capability::{ExtractionBackend, OcrBackend, Rasterizer, SummaryBackend};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::landing;
use crate::pipeline::extract::{self, ExtractionResult};
use crate::pipeline::reduce::{self, EncodedImage};
use crate::pipeline::scratch::ScratchDir;
use crate::pipeline::{ocr, summary};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::{record_id, DocumentRecord, Stage};
use crate::store::DocumentStore;
use crate::tracker::StateTracker;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{info, info_span, warn, Instrument};

/// One landed file to process.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// Local path of the landed PDF.
    pub path: PathBuf,
    /// Name the file landed under; the record id derives from it.
    pub blob_name: String,
    /// Extraction instructions.
    pub prompt: String,
    /// Example JSON schema the extraction must follow.
    pub json_schema: String,
    /// Defaults to the moment the run starts.
    pub request_timestamp: Option<DateTime<Utc>>,
}

impl DocumentRequest {
    pub fn new(
        path: impl Into<PathBuf>,
        prompt: impl Into<String>,
        json_schema: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            blob_name: landing::blob_name_for(&path),
            path,
            prompt: prompt.into(),
            json_schema: json_schema.into(),
            request_timestamp: None,
        }
    }

    pub fn with_blob_name(mut self, blob_name: impl Into<String>) -> Self {
        self.blob_name = blob_name.into();
        self
    }

    pub fn with_request_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.request_timestamp = Some(ts);
        self
    }
}

/// The outcome of one document run.
///
/// The record is always returned. On failure it holds every stage that
/// completed before the failure, plus the error trail.
#[derive(Debug)]
pub struct PipelineRun {
    pub record: DocumentRecord,
    pub error: Option<PipelineError>,
    /// Wall-clock time of the whole run.
    pub duration_secs: f64,
}

impl PipelineRun {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Treat any failure as an error, discarding the partial record.
    pub fn into_result(self) -> Result<DocumentRecord, PipelineError> {
        match self.error {
            None => Ok(self.record),
            Some(e) => Err(e),
        }
    }
}

/// The document-ingestion pipeline.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    tracker: StateTracker,
    ocr: Arc<dyn OcrBackend>,
    rasterizer: Arc<dyn Rasterizer>,
    extractor: Arc<dyn ExtractionBackend>,
    summarizer: Arc<dyn SummaryBackend>,
    progress: ProgressCallback,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            store: None,
            ocr: None,
            rasterizer: None,
            extractor: None,
            summarizer: None,
            progress: None,
        }
    }

    /// Production wiring: pdfium rasterisation and LLM-backed OCR,
    /// extraction and summary, all sharing one provider. Returns the builder
    /// so callers can still attach a progress callback.
    pub fn llm_builder(
        config: PipelineConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<PipelineBuilder, PipelineError> {
        let provider = llm::resolve_provider(&config)?;
        let rasterizer = Arc::new(PdfiumRasterizer::new(config.max_rendered_pixels));
        let ocr = llm::VisionOcr::new(Arc::clone(&provider), rasterizer.clone(), &config);
        let extractor = llm::LlmExtractor::new(Arc::clone(&provider), &config);
        let summarizer = llm::LlmSummarizer::new(provider, &config);
        Ok(Self::builder(config)
            .store(store)
            .ocr(Arc::new(ocr))
            .rasterizer(rasterizer)
            .extractor(Arc::new(extractor))
            .summarizer(Arc::new(summarizer)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Process one landed file.
    pub async fn run(&self, request: DocumentRequest) -> PipelineRun {
        let span = info_span!("document", id = %record_id(&request.blob_name));
        self.run_inner(request).instrument(span).await
    }

    /// Process many files, at most `concurrency` at a time.
    ///
    /// Each document is owned by exactly one task. Two requests with the same
    /// blob name race on the same record and the last upsert wins.
    /// Results come back in completion order.
    pub async fn run_batch(
        &self,
        requests: Vec<DocumentRequest>,
        concurrency: usize,
    ) -> Vec<PipelineRun> {
        stream::iter(requests.into_iter().map(|r| self.run(r)))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    async fn run_inner(&self, request: DocumentRequest) -> PipelineRun {
        let start = Instant::now();
        info!("Starting pipeline: {}", request.blob_name);

        let landed = landing::validate(&request.path);
        let landing_secs = start.elapsed().as_secs_f64();

        let mut record = DocumentRecord::new(
            request.blob_name.clone(),
            landed.as_ref().map(|l| l.size).unwrap_or(0),
            request.prompt.clone(),
            request.json_schema.clone(),
            self.config.model_deployment.clone(),
            request.request_timestamp.unwrap_or_else(Utc::now),
        );
        self.progress.on_document_start(record.id());

        let result = match self.tracker.persist(&record).await {
            Ok(()) => self.drive(&mut record, &request.path, landed, landing_secs, start).await,
            Err(e) => Err(e),
        };

        let duration_secs = start.elapsed().as_secs_f64();
        match &result {
            Ok(()) => info!("Pipeline complete: {} in {:.2}s", record.id(), duration_secs),
            Err(e) => warn!("Pipeline stopped: {}: {}", record.id(), e),
        }
        self.progress.on_document_complete(record.id(), result.is_ok());

        PipelineRun {
            record,
            error: result.err(),
            duration_secs,
        }
    }

    async fn drive(
        &self,
        record: &mut DocumentRecord,
        path: &Path,
        landed: Result<landing::LandedFile, PipelineError>,
        landing_secs: f64,
        start: Instant,
    ) -> Result<(), PipelineError> {
        // ── Step 1: Landing ──────────────────────────────────────────────────
        self.progress.on_stage_start(record.id(), Stage::FileLanded);
        if let Err(e) = landed {
            return Err(self.fail_stage(record, Stage::FileLanded, e, true).await);
        }
        self.complete(record, Stage::FileLanded, landing_secs).await?;

        // ── Step 2: OCR ──────────────────────────────────────────────────────
        let mut attempt = 0;
        let ocr_output = loop {
            self.progress.on_stage_start(record.id(), Stage::OcrCompleted);
            match ocr::run_ocr(&*self.ocr, &self.tracker, record, path).await {
                Ok(o) => break o,
                Err(e) => {
                    attempt += 1;
                    self.retry_or_fail(record, Stage::OcrCompleted, e, attempt, true)
                        .await?;
                }
            }
        };
        self.notify_complete(record, Stage::OcrCompleted);

        // ── Step 3: Images + extraction, scratch removed on every path ───────
        let scratch = match &self.config.scratch_root {
            Some(root) => ScratchDir::create_in(root, record.id()),
            None => ScratchDir::create(record.id()),
        };
        let scratch = match scratch {
            Ok(s) => s,
            Err(e) => {
                return Err(self
                    .fail_stage(record, Stage::GptExtractionCompleted, e, true)
                    .await)
            }
        };
        let extraction = self.extract_with_images(record, path, &scratch, &ocr_output.text).await;
        scratch.cleanup();
        let extraction = extraction?;
        self.notify_complete(record, Stage::GptExtractionCompleted);

        // ── Step 4: Summary ──────────────────────────────────────────────────
        let mut attempt = 0;
        loop {
            self.progress.on_stage_start(record.id(), Stage::GptSummaryCompleted);
            match summary::run_summary(&*self.summarizer, &self.tracker, record, &extraction).await
            {
                Ok(_) => break,
                Err(e) => {
                    attempt += 1;
                    // The summary stage records its own failures.
                    self.retry_or_fail(record, Stage::GptSummaryCompleted, e, attempt, false)
                        .await?;
                }
            }
        }
        self.notify_complete(record, Stage::GptSummaryCompleted);

        // ── Step 5: Done ─────────────────────────────────────────────────────
        self.complete(record, Stage::ProcessingCompleted, start.elapsed().as_secs_f64())
            .await
    }

    async fn extract_with_images(
        &self,
        record: &mut DocumentRecord,
        path: &Path,
        scratch: &ScratchDir,
        ocr_text: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let images = self.prepare_images(record, path, scratch).await?;

        let mut attempt = 0;
        loop {
            self.progress
                .on_stage_start(record.id(), Stage::GptExtractionCompleted);
            match extract::run_extraction(&*self.extractor, &self.tracker, record, ocr_text, &images)
                .await
            {
                Ok(r) => return Ok(r),
                Err(e) => {
                    attempt += 1;
                    self.retry_or_fail(record, Stage::GptExtractionCompleted, e, attempt, true)
                        .await?;
                }
            }
        }
    }

    /// Rasterise into scratch and reduce to the configured budget.
    ///
    /// A rasterisation failure is noted on the record and extraction goes
    /// ahead on text alone; image attachments are an enhancement.
    async fn prepare_images(
        &self,
        record: &mut DocumentRecord,
        path: &Path,
        scratch: &ScratchDir,
    ) -> Result<Vec<EncodedImage>, PipelineError> {
        let pages = match self.rasterizer.rasterize(path, scratch.path()).await {
            Ok(p) => p,
            Err(e) => {
                warn!("{}: rasterisation failed, extracting from text only: {}", record.id(), e);
                record.push_error(format!("Image extraction error: {e}"));
                self.tracker.persist(record).await?;
                return Ok(Vec::new());
            }
        };
        match reduce::load_reduced(
            &pages,
            self.config.max_images,
            self.config.vision_limit_bytes(),
        )
        .await
        {
            Ok(images) => Ok(images),
            Err(e) => Err(self
                .fail_stage(record, Stage::GptExtractionCompleted, e, true)
                .await),
        }
    }

    async fn complete(
        &self,
        record: &mut DocumentRecord,
        stage: Stage,
        secs: f64,
    ) -> Result<(), PipelineError> {
        self.tracker.report(record, stage, true, Some(secs)).await?;
        self.notify_complete(record, stage);
        Ok(())
    }

    fn notify_complete(&self, record: &DocumentRecord, stage: Stage) {
        let secs = record.state().duration(stage).unwrap_or_default();
        self.progress.on_stage_complete(record.id(), stage, secs);
    }

    /// Record a failed attempt, then either back off (`Ok`) or give up (`Err`).
    async fn retry_or_fail(
        &self,
        record: &mut DocumentRecord,
        stage: Stage,
        error: PipelineError,
        attempt: u32,
        record_error: bool,
    ) -> Result<(), PipelineError> {
        if matches!(error, PipelineError::PersistenceFailure { .. }) {
            self.progress
                .on_stage_error(record.id(), stage, error.to_string());
            return Err(error);
        }
        let retry = error.is_transient() && attempt <= self.config.max_stage_retries;
        let error = self.fail_stage(record, stage, error, record_error).await;
        if !retry || matches!(error, PipelineError::PersistenceFailure { .. }) {
            return Err(error);
        }

        let backoff = self.config.backoff_ms(attempt);
        warn!(
            "{}: {} retry {}/{} after {}ms",
            record.id(),
            stage,
            attempt,
            self.config.max_stage_retries,
            backoff
        );
        sleep(Duration::from_millis(backoff)).await;
        Ok(())
    }

    /// Append the error and report the stage false; returns the error to
    /// propagate (a persistence failure replaces the original).
    async fn fail_stage(
        &self,
        record: &mut DocumentRecord,
        stage: Stage,
        error: PipelineError,
        record_error: bool,
    ) -> PipelineError {
        self.progress
            .on_stage_error(record.id(), stage, error.to_string());
        if record_error {
            record.push_stage_error(stage, &error);
            if let Err(persist) = self.tracker.report(record, stage, false, None).await {
                return persist;
            }
        }
        error
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    store: Option<Arc<dyn DocumentStore>>,
    ocr: Option<Arc<dyn OcrBackend>>,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    extractor: Option<Arc<dyn ExtractionBackend>>,
    summarizer: Option<Arc<dyn SummaryBackend>>,
    progress: Option<ProgressCallback>,
}

impl PipelineBuilder {
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ocr(mut self, ocr: Arc<dyn OcrBackend>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ExtractionBackend>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn SummaryBackend>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    /// Build the pipeline; every capability must be set.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        fn missing(what: &str) -> PipelineError {
            PipelineError::InvalidConfig(format!("pipeline has no {what} configured"))
        }
        Ok(Pipeline {
            tracker: StateTracker::new(self.store.ok_or_else(|| missing("document store"))?),
            ocr: self.ocr.ok_or_else(|| missing("OCR backend"))?,
            rasterizer: self.rasterizer.ok_or_else(|| missing("rasterizer"))?,
            extractor: self.extractor.ok_or_else(|| missing("extraction backend"))?,
            summarizer: self.summarizer.ok_or_else(|| missing("summary backend"))?,
            progress: self
                .progress
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            config: self.config,
        })
    }
}
