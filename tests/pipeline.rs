//! Integration tests for the document pipeline.
//!
//! Every capability is a deterministic in-process fake, so these run without
//! pdfium or an LLM provider. Landed files are real temp files starting with
//! the `%PDF` magic.

use async_trait::async_trait;
use docstage::{
    Capability, DocumentRecord, DocumentRequest, DocumentStore, EncodedImage, ExtractionBackend,
    ExtractionRequest, ExtractionResult, JsonFileStore, MemoryStore, OcrBackend, OcrOutput,
    Pipeline, PipelineConfig, PipelineError, Rasterizer, Stage, SummaryBackend, SummaryOutput,
    UNKNOWN_CLASSIFICATION,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// OCR that fails its first `failures` calls.
struct FakeOcr {
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FakeOcr {
    fn ok() -> Arc<Self> {
        Self::failing(0)
    }

    fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl OcrBackend for FakeOcr {
    async fn ocr(&self, _file: &Path) -> Result<OcrOutput, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PipelineError::capability(Capability::Ocr, "503 Service Unavailable"));
        }
        Ok(OcrOutput {
            text: "ACME Corp\nINVOICE 42\nTOTAL 99.50".into(),
            raw: json!({ "pages": 1 }),
        })
    }
}

/// Writes `pages` small files into the scratch directory and remembers
/// where it wrote them.
struct FakeRasterizer {
    pages: usize,
    fail: bool,
    scratch_seen: Mutex<Option<PathBuf>>,
}

impl FakeRasterizer {
    fn with_pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            fail: false,
            scratch_seen: Mutex::new(None),
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            pages: 0,
            fail: true,
            scratch_seen: Mutex::new(None),
        })
    }

    fn scratch_seen(&self) -> Option<PathBuf> {
        self.scratch_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, _pdf: &Path, scratch: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        *self.scratch_seen.lock().unwrap() = Some(scratch.to_path_buf());
        if self.fail {
            return Err(PipelineError::RasterisationFailed {
                page: 0,
                detail: "corrupt xref table".into(),
            });
        }
        let mut out = Vec::new();
        for n in 1..=self.pages {
            let path = scratch.join(format!("page-{n:04}.jpeg"));
            std::fs::write(&path, vec![0xFFu8; 64]).unwrap();
            out.push(path);
        }
        Ok(out)
    }
}

/// Returns a fixed answer and records how many images each call carried.
struct FakeExtractor {
    answer: String,
    failures: AtomicU32,
    image_counts: Mutex<Vec<usize>>,
}

impl FakeExtractor {
    fn answering(answer: &str) -> Arc<Self> {
        Self::flaky(answer, 0)
    }

    fn flaky(answer: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            failures: AtomicU32::new(failures),
            image_counts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.image_counts.lock().unwrap().len()
    }

    fn last_image_count(&self) -> Option<usize> {
        self.image_counts.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl ExtractionBackend for FakeExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<String, PipelineError> {
        self.image_counts.lock().unwrap().push(request.images.len());
        assert!(request.ocr_text.contains("INVOICE 42"));
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PipelineError::capability(Capability::Extraction, "429 Too Many Requests"));
        }
        Ok(self.answer.clone())
    }
}

struct FakeSummarizer {
    fail: bool,
    classification: Option<String>,
}

impl FakeSummarizer {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            classification: None,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            classification: None,
        })
    }
}

#[async_trait]
impl SummaryBackend for FakeSummarizer {
    async fn summarize(&self, extraction: &ExtractionResult) -> Result<SummaryOutput, PipelineError> {
        if self.fail {
            return Err(PipelineError::capability(Capability::Summarization, "timeout"));
        }
        Ok(SummaryOutput {
            text: format!("Invoice totalling {}.", extraction.value["total"]),
            classification: self.classification.clone(),
        })
    }
}

/// Memory store that rejects upserts once OCR is marked complete, until
/// `recover` is called.
#[derive(Default)]
struct BrokenAfterOcrStore {
    inner: MemoryStore,
    recovered: AtomicBool,
}

impl BrokenAfterOcrStore {
    fn recover(&self) {
        self.recovered.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for BrokenAfterOcrStore {
    async fn upsert(&self, record: &DocumentRecord) -> Result<(), PipelineError> {
        if record.state().ocr_completed && !self.recovered.load(Ordering::SeqCst) {
            return Err(PipelineError::Internal("connection reset".into()));
        }
        self.inner.upsert(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PipelineError> {
        self.inner.get(id).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const SCHEMA_WITH_CATEGORY: &str = r#"{"invoice_number": "", "total": 0, "categorization": ""}"#;

const GOOD_ANSWER: &str = "Here you go:\n```json\n{\"invoice_number\": \"42\", \"total\": 99.5, \"categorization\": \"invoice\"}\n```";

fn write_pdf(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"%PDF-1.7\n% fake body\n%%EOF\n").unwrap();
    path
}

fn request(path: &Path, schema: &str) -> DocumentRequest {
    DocumentRequest::new(path, "Extract the invoice header", schema)
        .with_blob_name("datasets/default/invoice.pdf")
}

struct Harness {
    store: Arc<MemoryStore>,
    ocr: Arc<FakeOcr>,
    rasterizer: Arc<FakeRasterizer>,
    extractor: Arc<FakeExtractor>,
    summarizer: Arc<FakeSummarizer>,
    config: PipelineConfig,
}

/// Route pipeline logs through the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        Self {
            store: Arc::new(MemoryStore::new()),
            ocr: FakeOcr::ok(),
            rasterizer: FakeRasterizer::with_pages(3),
            extractor: FakeExtractor::answering(GOOD_ANSWER),
            summarizer: FakeSummarizer::ok(),
            config: PipelineConfig::builder()
                .model_deployment("gpt-4o")
                .retry_backoff_ms(1)
                .build()
                .unwrap(),
        }
    }

    fn pipeline(&self) -> Pipeline {
        self.pipeline_with_store(self.store.clone())
    }

    fn pipeline_with_store(&self, store: Arc<dyn DocumentStore>) -> Pipeline {
        Pipeline::builder(self.config.clone())
            .store(store)
            .ocr(self.ocr.clone())
            .rasterizer(self.rasterizer.clone())
            .extractor(self.extractor.clone())
            .summarizer(self.summarizer.clone())
            .build()
            .unwrap()
    }

    async fn stored(&self, id: &str) -> DocumentRecord {
        self.store.get(id).await.unwrap().expect("record persisted")
    }
}

const ID: &str = "datasets__default__invoice.pdf";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_completes_every_stage() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let h = Harness::new();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success(), "error: {:?}", run.error);

    let record = h.stored(ID).await;
    assert_eq!(record, run.record);
    assert!(record.is_complete());
    for stage in Stage::ALL {
        assert!(record.state().is_complete(stage), "{stage} not set");
        assert!(record.state().duration(stage).is_some(), "{stage} has no duration");
    }
    assert!(record.errors().is_empty());

    let data = &record.extracted_data;
    assert!(data.ocr_output.contains("INVOICE 42"));
    assert_eq!(data.gpt_extraction_output["total"], json!(99.5));
    assert_eq!(data.classification, "invoice");
    assert_eq!(data.gpt_summary_output, "Invoice totalling 99.5.");
    assert_eq!(record.model_input().model_deployment.as_deref(), Some("gpt-4o"));
    assert_eq!(record.properties().blob_name, "datasets/default/invoice.pdf");
    assert_eq!(h.extractor.last_image_count(), Some(3));

    // Total run time covers every stage before it.
    let total = record.state().duration(Stage::ProcessingCompleted).unwrap();
    let ocr = record.state().duration(Stage::OcrCompleted).unwrap();
    assert!(total >= ocr);
}

#[tokio::test]
async fn ocr_failure_is_recorded_and_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.ocr = FakeOcr::failing(1);

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(matches!(
        run.error,
        Some(PipelineError::CapabilityUnavailable { capability: Capability::Ocr, .. })
    ));

    let record = h.stored(ID).await;
    assert!(record.state().file_landed);
    assert!(!record.state().ocr_completed);
    assert!(!record.state().gpt_extraction_completed);
    assert!(!record.state().processing_completed);
    assert_eq!(record.errors().len(), 1);
    assert!(record.errors()[0].starts_with("OCR error:"), "got: {}", record.errors()[0]);
    assert!(record.errors()[0].contains("503"));
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_and_each_attempt_noted() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.ocr = FakeOcr::failing(2);
    h.config = PipelineConfig::builder()
        .max_stage_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success(), "error: {:?}", run.error);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 3);

    let record = h.stored(ID).await;
    assert!(record.state().ocr_completed);
    assert!(record.is_complete());
    let ocr_errors = record
        .errors()
        .iter()
        .filter(|e| e.starts_with("OCR error:"))
        .count();
    assert_eq!(ocr_errors, 2);
}

#[tokio::test]
async fn extraction_retry_reuses_the_same_images() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.extractor = FakeExtractor::flaky(GOOD_ANSWER, 1);
    h.config = PipelineConfig::builder()
        .max_stage_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success(), "error: {:?}", run.error);
    assert_eq!(*h.extractor.image_counts.lock().unwrap(), vec![3, 3]);

    let record = h.stored(ID).await;
    assert!(record.state().gpt_extraction_completed);
    assert_eq!(record.errors().len(), 1);
    assert!(record.errors()[0].starts_with("GPT extraction error:"));
    assert!(record.errors()[0].contains("429"));
}

#[tokio::test]
async fn malformed_extraction_is_distinct_from_backend_failure() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.extractor = FakeExtractor::answering("I could not find any invoice fields, sorry.");
    h.config = PipelineConfig::builder()
        .max_stage_retries(3)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(matches!(
        run.error,
        Some(PipelineError::MalformedExtractionOutput { .. })
    ));
    // Not transient, so never retried.
    assert_eq!(h.extractor.calls(), 1);

    let record = h.stored(ID).await;
    assert!(record.state().ocr_completed);
    assert!(!record.state().gpt_extraction_completed);
    assert!(!record.state().gpt_summary_completed);
    assert_eq!(record.errors().len(), 1);
    assert!(record.errors()[0].starts_with("GPT extraction error:"));
    assert_eq!(record.extracted_data.gpt_extraction_output, json!({}));
}

#[tokio::test]
async fn summary_failure_keeps_extraction_and_records_one_error() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.summarizer = FakeSummarizer::failing();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(matches!(
        run.error,
        Some(PipelineError::CapabilityUnavailable {
            capability: Capability::Summarization,
            ..
        })
    ));

    let record = h.stored(ID).await;
    assert!(record.state().gpt_extraction_completed);
    assert!(!record.state().gpt_summary_completed);
    assert!(!record.state().processing_completed);
    assert_eq!(record.extracted_data.gpt_extraction_output["invoice_number"], json!("42"));
    assert_eq!(record.extracted_data.classification, "invoice");
    assert_eq!(record.errors().len(), 1, "errors: {:?}", record.errors());
    assert!(record.errors()[0].starts_with("NL processing error:"));
}

#[tokio::test]
async fn missing_categorization_defaults_classification() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.extractor = FakeExtractor::answering("```json\n{\"invoice_number\": \"42\", \"total\": 1}\n```");

    let run = h
        .pipeline()
        .run(request(&pdf, r#"{"invoice_number": "", "total": 0}"#))
        .await;
    assert!(run.is_success(), "error: {:?}", run.error);
    assert_eq!(run.record.extracted_data.classification, UNKNOWN_CLASSIFICATION);
    assert!(run.record.state().gpt_summary_completed);
}

#[tokio::test]
async fn summary_backend_can_classify_when_schema_does_not() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.extractor = FakeExtractor::answering("```json\n{\"total\": 1}\n```");
    h.summarizer = Arc::new(FakeSummarizer {
        fail: false,
        classification: Some("receipt".into()),
    });

    let run = h.pipeline().run(request(&pdf, r#"{"total": 0}"#)).await;
    assert!(run.is_success());
    assert_eq!(run.record.extracted_data.classification, "receipt");
}

#[tokio::test]
async fn images_are_capped_and_scratch_is_removed() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.rasterizer = FakeRasterizer::with_pages(12);
    h.config = PipelineConfig::builder().max_images(4).build().unwrap();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success());
    assert_eq!(h.extractor.last_image_count(), Some(4));

    let scratch = h.rasterizer.scratch_seen().expect("rasterizer called");
    assert!(!scratch.exists(), "scratch {} left behind", scratch.display());
}

#[tokio::test]
async fn scratch_is_removed_when_extraction_fails() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.extractor = FakeExtractor::answering("no json here");

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(!run.is_success());
    let scratch = h.rasterizer.scratch_seen().expect("rasterizer called");
    assert!(!scratch.exists());
}

#[tokio::test]
async fn scratch_lives_under_the_configured_root() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let scratch_root = TempDir::new().unwrap();
    let mut h = Harness::new();
    h.config = PipelineConfig::builder()
        .scratch_root(scratch_root.path())
        .build()
        .unwrap();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success());
    let scratch = h.rasterizer.scratch_seen().unwrap();
    assert!(scratch.starts_with(scratch_root.path()));
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn rasterisation_failure_falls_back_to_text_only() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.rasterizer = FakeRasterizer::broken();

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success(), "error: {:?}", run.error);
    assert_eq!(h.extractor.last_image_count(), Some(0));

    let record = h.stored(ID).await;
    assert!(record.is_complete());
    assert_eq!(record.errors().len(), 1);
    assert!(record.errors()[0].starts_with("Image extraction error:"));
}

#[tokio::test]
async fn empty_image_set_is_accepted() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let mut h = Harness::new();
    h.rasterizer = FakeRasterizer::with_pages(0);

    let run = h.pipeline().run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success());
    assert_eq!(h.extractor.last_image_count(), Some(0));
    assert!(run.record.errors().is_empty());
}

#[tokio::test]
async fn persistence_failure_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let h = Harness::new();
    let store = Arc::new(BrokenAfterOcrStore::default());

    let pipeline = h.pipeline_with_store(store.clone());
    let run = pipeline.run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(matches!(
        run.error,
        Some(PipelineError::PersistenceFailure { ref id, .. }) if id == ID
    ));
    // OCR finished in memory, but nothing after it ran.
    assert!(run.record.state().ocr_completed);
    assert_eq!(h.extractor.calls(), 0);

    let stored = store.get(ID).await.unwrap().unwrap();
    assert!(stored.state().file_landed);
    assert!(!stored.state().ocr_completed);

    // Retrying the upsert makes the finished OCR durable without redoing it.
    store.recover();
    pipeline.tracker().persist(&run.record).await.unwrap();
    let stored = store.get(ID).await.unwrap().unwrap();
    assert!(stored.state().ocr_completed);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_pdf_is_rejected_at_landing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, b"just some text").unwrap();
    let h = Harness::new();

    let run = h
        .pipeline()
        .run(DocumentRequest::new(&path, "p", "{}").with_blob_name("notes.pdf"))
        .await;
    assert!(matches!(run.error, Some(PipelineError::NotAPdf { .. })));

    let record = h.stored("notes.pdf").await;
    assert!(!record.state().file_landed);
    assert!(record.errors()[0].starts_with("File landing error:"));
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_file_is_rejected_at_landing() {
    let dir = TempDir::new().unwrap();
    let h = Harness::new();

    let run = h
        .pipeline()
        .run(DocumentRequest::new(dir.path().join("gone.pdf"), "p", "{}"))
        .await;
    assert!(matches!(run.error, Some(PipelineError::FileNotFound { .. })));
    assert_eq!(run.record.properties().blob_size, 0);
}

#[tokio::test]
async fn rerun_overwrites_the_same_record() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let store_dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::open(store_dir.path()).await.unwrap());
    let mut h = Harness::new();
    h.summarizer = FakeSummarizer::failing();

    let first = h
        .pipeline_with_store(store.clone())
        .run(request(&pdf, SCHEMA_WITH_CATEGORY))
        .await;
    assert!(!first.is_success());

    h.summarizer = FakeSummarizer::ok();
    let second = h
        .pipeline_with_store(store.clone())
        .run(request(&pdf, SCHEMA_WITH_CATEGORY))
        .await;
    assert!(second.is_success());

    let files: Vec<_> = std::fs::read_dir(store_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(files.len(), 1);

    // A rerun starts from a fresh record, so the old error is gone.
    let stored = store.get(ID).await.unwrap().unwrap();
    assert!(stored.is_complete());
    assert!(stored.errors().is_empty());
}

#[tokio::test]
async fn batch_processes_every_request() {
    let dir = TempDir::new().unwrap();
    let h = Harness::new();
    let requests: Vec<_> = (0..5)
        .map(|i| {
            let pdf = write_pdf(&dir, &format!("doc-{i}.pdf"));
            DocumentRequest::new(&pdf, "Extract", SCHEMA_WITH_CATEGORY)
                .with_blob_name(format!("batch/doc-{i}.pdf"))
        })
        .collect();

    let runs = h.pipeline().run_batch(requests, 3).await;
    assert_eq!(runs.len(), 5);
    assert!(runs.iter().all(|r| r.is_success()));
    assert_eq!(h.store.len(), 5);
    assert!(h.store.get("batch__doc-3.pdf").await.unwrap().is_some());
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    use docstage::PipelineProgressCallback;

    #[derive(Default)]
    struct Counting {
        completed: AtomicUsize,
        errors: AtomicUsize,
        documents: AtomicUsize,
    }
    impl PipelineProgressCallback for Counting {
        fn on_stage_complete(&self, _id: &str, _stage: Stage, _secs: f64) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stage_error(&self, _id: &str, _stage: Stage, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_document_complete(&self, _id: &str, _success: bool) {
            self.documents.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(&dir, "invoice.pdf");
    let h = Harness::new();
    let counting = Arc::new(Counting::default());
    let pipeline = Pipeline::builder(h.config.clone())
        .store(h.store.clone())
        .ocr(h.ocr.clone())
        .rasterizer(h.rasterizer.clone())
        .extractor(h.extractor.clone())
        .summarizer(h.summarizer.clone())
        .progress_callback(counting.clone())
        .build()
        .unwrap();

    let run = pipeline.run(request(&pdf, SCHEMA_WITH_CATEGORY)).await;
    assert!(run.is_success());
    assert_eq!(counting.completed.load(Ordering::SeqCst), Stage::ALL.len());
    assert_eq!(counting.errors.load(Ordering::SeqCst), 0);
    assert_eq!(counting.documents.load(Ordering::SeqCst), 1);
}

#[test]
fn encoded_image_is_exported_for_custom_backends() {
    let img = EncodedImage {
        page_num: 1,
        mime_type: "image/png",
        base64: "QUJD".into(),
    };
    assert_eq!(img.encoded_len(), 4);
}
