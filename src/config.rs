//! Configuration types for the MemeFact pipeline
//!
//! One [`MemeFactConfig`] is built at process start (file + `MEMEFACT__*`
//! environment overrides) and handed by reference to the components that need
//! it. Provider credentials are read once from the environment (a `.env` file is
//! honoured) and kept as [`SecretString`].

use crate::error::{Error, Result};
use crate::prompt::{ContextField, PromptKind};
use crate::types::{BackendId, SamplingMode};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Temperatures used for each sampling mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingPolicy {
    /// Temperature for judge-style, deterministic calls
    #[serde(default = "default_deterministic_temperature")]
    pub deterministic_temperature: f32,
    /// Temperature for generator-style, creative calls
    #[serde(default = "default_creative_temperature")]
    pub creative_temperature: f32,
    /// Max tokens when the caller does not ask for a specific value
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
}

fn default_deterministic_temperature() -> f32 { 0.2 }
fn default_creative_temperature() -> f32 { 0.7 }

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            deterministic_temperature: default_deterministic_temperature(),
            creative_temperature: default_creative_temperature(),
            default_max_tokens: None,
        }
    }
}

impl SamplingPolicy {
    /// Concrete temperature for a sampling mode
    pub fn temperature(&self, mode: SamplingMode) -> f32 {
        match mode {
            SamplingMode::Deterministic => self.deterministic_temperature,
            SamplingMode::Creative => self.creative_temperature,
        }
    }

    /// Check that deterministic sampling is really the lower-variance mode
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.deterministic_temperature)
            || !(0.0..=2.0).contains(&self.creative_temperature)
        {
            return Err(Error::config("temperatures must be within 0.0-2.0"));
        }
        if self.deterministic_temperature >= self.creative_temperature {
            return Err(Error::config(
                "deterministic temperature must be lower than creative temperature",
            ));
        }
        Ok(())
    }
}

/// Bounded exponential backoff for transient backend errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1_000 }
fn default_max_delay_ms() -> u64 { 60_000 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(32)).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Settings for the model gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Sampling policy
    #[serde(default)]
    pub sampling: SamplingPolicy,
    /// Optional client-side rate limit across all backends
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

fn default_timeout_secs() -> u64 { 120 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
            sampling: SamplingPolicy::default(),
            requests_per_minute: None,
        }
    }
}

impl GatewayConfig {
    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which generation strategy the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Captions for user-supplied templates, single model
    Baseline,
    /// Retrieved templates, single model
    Rag,
    /// Retrieved templates, two generators and a judge
    Debate,
}

/// Roster of the debate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// First generator
    pub generator_a: BackendId,
    /// Second generator
    pub generator_b: BackendId,
    /// Judge for rounds 2 and 4
    pub judge: BackendId,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            generator_a: BackendId::Gpt4o,
            generator_b: BackendId::ClaudeSonnet,
            judge: BackendId::GeminiPro,
        }
    }
}

/// Settings for the caption pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Generation variant
    #[serde(default = "default_variant")]
    pub variant: Variant,
    /// Candidates per batch
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
    /// Backend for baseline/RAG generation
    #[serde(default = "default_backend")]
    pub backend: BackendId,
    /// Prompt kind for baseline/RAG generation
    #[serde(default = "default_prompt_kind")]
    pub prompt_kind: PromptKind,
    /// Whether rendered memes go through the safety classifier
    #[serde(default)]
    pub enable_moderation: bool,
    /// Generate/render/moderate cycles before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Name of the ablation (field subset) to apply to the article
    #[serde(default = "default_ablation")]
    pub ablation: String,
}

fn default_variant() -> Variant { Variant::Debate }
fn default_num_candidates() -> usize { 1 }
fn default_backend() -> BackendId { BackendId::Gpt4o }
fn default_prompt_kind() -> PromptKind { PromptKind::FewShot }
fn default_max_attempts() -> u32 { 3 }
fn default_ablation() -> String { "default".to_string() }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            num_candidates: default_num_candidates(),
            backend: default_backend(),
            prompt_kind: default_prompt_kind(),
            enable_moderation: false,
            max_attempts: default_max_attempts(),
            ablation: default_ablation(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemeFactConfig {
    /// Gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Debate roster
    #[serde(default)]
    pub debate: DebateConfig,
    /// Named article-field subsets; `default` exposes every field when absent
    #[serde(default)]
    pub ablations: BTreeMap<String, Vec<ContextField>>,
    /// Prompt template file replacing the built-in templates
    #[serde(default)]
    pub prompts_path: Option<PathBuf>,
}

impl MemeFactConfig {
    /// Load configuration from an optional file plus `MEMEFACT__*` overrides
    ///
    /// Nested keys use a double underscore, e.g.
    /// `MEMEFACT__PIPELINE__MAX_ATTEMPTS=5`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MEMEFACT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.gateway.sampling.validate()?;
        if self.pipeline.max_attempts == 0 {
            return Err(Error::config("pipeline.max_attempts must be at least 1"));
        }
        if self.pipeline.num_candidates == 0 {
            return Err(Error::config("pipeline.num_candidates must be at least 1"));
        }
        if self.pipeline.ablation != "default" && !self.ablations.contains_key(&self.pipeline.ablation) {
            return Err(Error::config(format!(
                "ablation `{}` is not defined",
                self.pipeline.ablation
            )));
        }
        Ok(())
    }

    /// Fields exposed by the configured ablation (`None` = all fields)
    pub fn ablation_fields(&self) -> Option<&[ContextField]> {
        self.ablations
            .get(&self.pipeline.ablation)
            .map(|fields| fields.as_slice())
    }
}

/// OpenRouter client configuration
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// API key (loaded from environment variable)
    pub api_key: SecretString,
    /// Base URL for OpenRouter API
    pub base_url: Url,
    /// Request timeout
    pub timeout: Duration,
    /// App name for OpenRouter tracking
    pub app_name: String,
}

impl OpenRouterConfig {
    /// Create a new OpenRouter configuration from environment
    pub fn from_env() -> Result<Self> {
        // Load .env if present so local development picks up OPENROUTER_API_KEY
        let _ = dotenv();

        let api_key = std::env::var("OPENROUTER_API_KEY")
            .or_else(|_| std::env::var("OPEN_ROUTER_API_KEY"))
            .map_err(|_| Error::config("OPENROUTER_API_KEY environment variable not set"))?;

        let mut config = Self::new(api_key)?;
        if let Ok(app_name) = std::env::var("OPENROUTER_APP_NAME") {
            config.app_name = app_name;
        }
        Ok(config)
    }

    /// Create a new OpenRouter configuration with a specific API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            base_url: parse_url("https://openrouter.ai/api/v1")?,
            timeout: Duration::from_secs(120),
            app_name: "MemeFact".to_string(),
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the app name
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Anthropic messages API configuration
#[derive(Clone)]
pub struct AnthropicConfig {
    /// API key
    pub api_key: SecretString,
    /// Base URL for the API
    pub base_url: Url,
    /// API version header value
    pub api_version: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max tokens when the request leaves it unset (the API requires one)
    pub default_max_tokens: u32,
}

impl AnthropicConfig {
    /// Create configuration from `ANTHROPIC_API_KEY`
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::config("ANTHROPIC_API_KEY environment variable not set"))?;
        Self::new(api_key)
    }

    /// Create configuration with a specific API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            base_url: parse_url("https://api.anthropic.com/v1")?,
            api_version: "2023-06-01".to_string(),
            timeout: Duration::from_secs(120),
            default_max_tokens: 1000,
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// ImgFlip credentials
#[derive(Clone)]
pub struct ImgFlipConfig {
    /// Account name
    pub username: String,
    /// Account password
    pub password: SecretString,
    /// API base URL
    pub base_url: Url,
    /// Caption font
    pub font: String,
    /// Maximum font size in pixels
    pub max_font_size: u32,
}

impl ImgFlipConfig {
    /// Create configuration from `IMG_FLIP_API_USERNAME` / `IMG_FLIP_API_PASSWORD`
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        let username = std::env::var("IMG_FLIP_API_USERNAME")
            .map_err(|_| Error::config("IMG_FLIP_API_USERNAME environment variable not set"))?;
        let password = std::env::var("IMG_FLIP_API_PASSWORD")
            .map_err(|_| Error::config("IMG_FLIP_API_PASSWORD environment variable not set"))?;
        Self::new(username, password)
    }

    /// Create configuration with explicit credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Ok(Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            base_url: parse_url("https://api.imgflip.com")?,
            font: "impact".to_string(),
            max_font_size: 50,
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Get the password as a string
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for ImgFlipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImgFlipConfig")
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("invalid URL `{}`: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sampling_policy_orders_modes() {
        let policy = SamplingPolicy::default();
        assert!(policy.temperature(SamplingMode::Deterministic) < policy.temperature(SamplingMode::Creative));
        assert!(policy.validate().is_ok());

        let inverted = SamplingPolicy {
            deterministic_temperature: 0.9,
            creative_temperature: 0.3,
            default_max_tokens: None,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
pipeline:
  variant: rag
  num_candidates: 2
  max_attempts: 5
  enable_moderation: true
  ablation: claim_only
debate:
  generator_a: pixtral-large-2411
  generator_b: qwen-2-vl-72b-instruct
  judge: gpt-4o
ablations:
  claim_only: [claim, verdict]
"#
        )
        .unwrap();

        let config = MemeFactConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.variant, Variant::Rag);
        assert_eq!(config.pipeline.num_candidates, 2);
        assert_eq!(config.pipeline.max_attempts, 5);
        assert!(config.pipeline.enable_moderation);
        assert_eq!(config.debate.generator_a, BackendId::PixtralLarge);
        assert_eq!(config.debate.judge, BackendId::Gpt4o);
        assert_eq!(
            config.ablation_fields(),
            Some(&[ContextField::Claim, ContextField::Verdict][..])
        );
        assert_eq!(config.gateway.retry.max_retries, 3);
    }

    #[test]
    fn test_undefined_ablation_is_rejected() {
        let mut config = MemeFactConfig::default();
        config.pipeline.ablation = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = OpenRouterConfig::new("sk-or-secret").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-or-secret"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(config.api_key(), "sk-or-secret");
    }
}
