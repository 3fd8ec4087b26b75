//! LLM-backed capabilities on top of `edgequake-llm`.
//!
//! Three capabilities share one provider:
//!
//! * [`LlmExtractor`]  — extraction: system prompt, then a user turn with the
//!   caller's instructions, schema, OCR text and page images attached.
//! * [`LlmSummarizer`] — summary of the extraction JSON.
//! * [`VisionOcr`]     — OCR by rasterising the PDF and transcribing each page
//!   with a vision model, for deployments without a dedicated OCR service.
//!
//! Each capability makes its calls exactly once. A provider error becomes
//! [`PipelineError::CapabilityUnavailable`]; retrying is up to the
//! orchestrator.

use crate::capability::{
    ExtractionBackend, ExtractionRequest, OcrBackend, OcrOutput, Rasterizer, SummaryBackend,
    SummaryOutput,
};
use crate::config::PipelineConfig;
use crate::error::{Capability, PipelineError};
use crate::pipeline::extract::ExtractionResult;
use crate::pipeline::reduce;
use crate::pipeline::scratch::ScratchDir;
use crate::prompts::{
    extraction_user_message, summary_user_message, EXTRACTION_SYSTEM_PROMPT, OCR_SYSTEM_PROMPT,
    SUMMARY_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is.
/// 2. **Named provider + model** (`config.provider_name`) — the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config
        .model
        .as_deref()
        .or(config.model_deployment.as_deref())
        .unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        PipelineError::InvalidConfig(format!(
            "No LLM provider could be auto-detected from environment.\n\
            Set OPENAI_API_KEY, AZURE_OPENAI_API_KEY, ANTHROPIC_API_KEY, or --provider.\n\
            Error: {e}"
        ))
    })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        PipelineError::InvalidConfig(format!("LLM provider '{name}' is not configured: {e}"))
    })
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// One chat call, mapped into the capability error space.
async fn chat(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    capability: Capability,
) -> Result<String, PipelineError> {
    let start = Instant::now();
    let response = provider
        .chat(messages, Some(options))
        .await
        .map_err(|e| PipelineError::capability(capability, e))?;
    debug!(
        "{}: {} input tokens, {} output tokens, {:?}",
        capability,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );
    Ok(response.content)
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// [`ExtractionBackend`] over a chat provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    system_prompt: String,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            system_prompt: config
                .extraction_system_prompt
                .clone()
                .unwrap_or_else(|| EXTRACTION_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[async_trait]
impl ExtractionBackend for LlmExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<String, PipelineError> {
        let images: Vec<ImageData> = request.images.iter().map(|i| i.to_image_data()).collect();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(
                extraction_user_message(request.prompt, request.json_schema, request.ocr_text),
                images,
            ),
        ];
        chat(&self.provider, &messages, &self.options, Capability::Extraction).await
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// [`SummaryBackend`] over a chat provider.
///
/// Returns no classification of its own; the extraction schema supplies it.
pub struct LlmSummarizer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    system_prompt: String,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            system_prompt: config
                .summary_system_prompt
                .clone()
                .unwrap_or_else(|| SUMMARY_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[async_trait]
impl SummaryBackend for LlmSummarizer {
    async fn summarize(&self, extraction: &ExtractionResult) -> Result<SummaryOutput, PipelineError> {
        let body = serde_json::to_string_pretty(&extraction.value)
            .map_err(|e| PipelineError::Internal(format!("encode extraction: {e}")))?;
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(summary_user_message(&body), Vec::new()),
        ];
        let text = chat(&self.provider, &messages, &self.options, Capability::Summarization).await?;
        Ok(SummaryOutput {
            text: text.trim().to_string(),
            classification: None,
        })
    }
}

// ── Vision OCR ───────────────────────────────────────────────────────────────

/// [`OcrBackend`] that transcribes rasterised pages with a vision model.
///
/// Uses its own scratch directory under [`PipelineConfig::scratch_root`],
/// separate from the one the orchestrator creates for extraction images.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    rasterizer: Arc<dyn Rasterizer>,
    options: CompletionOptions,
    scratch_root: Option<PathBuf>,
}

impl VisionOcr {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        rasterizer: Arc<dyn Rasterizer>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            rasterizer,
            options: CompletionOptions {
                temperature: Some(0.0),
                max_tokens: Some(config.max_tokens),
                ..Default::default()
            },
            scratch_root: config.scratch_root.clone(),
        }
    }
}

#[async_trait]
impl OcrBackend for VisionOcr {
    async fn ocr(&self, file: &Path) -> Result<OcrOutput, PipelineError> {
        let scratch = match &self.scratch_root {
            Some(root) => ScratchDir::create_in(root, "ocr")?,
            None => ScratchDir::create("ocr")?,
        };
        let result = self.transcribe(file, &scratch).await;
        scratch.cleanup();
        result
    }
}

impl VisionOcr {
    async fn transcribe(&self, file: &Path, scratch: &ScratchDir) -> Result<OcrOutput, PipelineError> {
        let pages = self
            .rasterizer
            .rasterize(file, scratch.path())
            .await
            .map_err(|e| PipelineError::capability(Capability::Ocr, e))?;

        let mut texts = Vec::with_capacity(pages.len());
        let mut raw_pages = Vec::with_capacity(pages.len());
        for (idx, path) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let image = reduce::encode_file(path, page_num).await?;
            let messages = vec![
                ChatMessage::system(OCR_SYSTEM_PROMPT),
                ChatMessage::user_with_images("", vec![image.to_image_data()]),
            ];
            let text = chat(&self.provider, &messages, &self.options, Capability::Ocr).await?;
            let text = strip_outer_fence(&text);
            raw_pages.push(json!({ "page": page_num, "content": text }));
            texts.push(text);
        }

        Ok(OcrOutput {
            text: texts.join("\n\n"),
            raw: json!({ "page_count": pages.len(), "pages": raw_pages }),
        })
    }
}

// Models sometimes wrap transcriptions in a fence despite being told not to.
static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}
