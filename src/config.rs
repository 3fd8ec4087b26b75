//! Configuration for the ingestion pipeline and its LLM-backed capabilities.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. One struct is easy to share across the
//! concurrent document tasks of a batch and to log at startup.

use crate::error::PipelineError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use docstage::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_images(5)
///     .vision_limit_mb(10)
///     .model_deployment("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.vision_limit_bytes(), 10 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum page images attached to the extraction call. Default: 10.
    ///
    /// Earlier pages win: covers and summary pages tend to come first.
    pub max_images: usize,

    /// Combined base64 payload ceiling for attached images, in megabytes. Default: 20.
    ///
    /// Vision deployments reject requests above roughly 20 MB of image data.
    pub vision_limit_mb: u64,

    /// Model deployment identifier recorded in `model_input.model_deployment`.
    pub model_deployment: Option<String>,

    /// Orchestrator-level retries for a stage whose capability failed. Default: 0.
    ///
    /// Stages never retry on their own. Each failed attempt is written to the
    /// record's error list before the next one starts.
    pub max_stage_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Longest edge of a rasterised page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Parent directory for per-run scratch space. Default: the system temp dir.
    pub scratch_root: Option<PathBuf>,

    /// LLM model identifier for the built-in backends, e.g. "gpt-4o".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "azure", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction and summary calls. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per LLM call. Default: 4096.
    pub max_tokens: usize,

    /// Override for the extraction system prompt.
    pub extraction_system_prompt: Option<String>,

    /// Override for the summary system prompt.
    pub summary_system_prompt: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_images: 10,
            vision_limit_mb: 20,
            model_deployment: None,
            max_stage_retries: 0,
            retry_backoff_ms: 500,
            max_rendered_pixels: 2000,
            scratch_root: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            extraction_system_prompt: None,
            summary_system_prompt: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_images", &self.max_images)
            .field("vision_limit_mb", &self.vision_limit_mb)
            .field("model_deployment", &self.model_deployment)
            .field("max_stage_retries", &self.max_stage_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("scratch_root", &self.scratch_root)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The image payload ceiling in bytes.
    pub fn vision_limit_bytes(&self) -> u64 {
        self.vision_limit_mb.saturating_mul(1024 * 1024)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_images(mut self, n: usize) -> Self {
        self.config.max_images = n;
        self
    }

    pub fn vision_limit_mb(mut self, mb: u64) -> Self {
        self.config.vision_limit_mb = mb;
        self
    }

    pub fn model_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.config.model_deployment = Some(deployment.into());
        self
    }

    pub fn max_stage_retries(mut self, n: u32) -> Self {
        self.config.max_stage_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn extraction_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_system_prompt = Some(prompt.into());
        self
    }

    pub fn summary_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.summary_system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_images == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_images must be ≥ 1".into(),
            ));
        }
        if c.vision_limit_mb == 0 {
            return Err(PipelineError::InvalidConfig(
                "vision_limit_mb must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
