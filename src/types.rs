//! Core type definitions for the MemeFact pipeline

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for one debate or generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a run ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a meme candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(Uuid);

impl CandidateId {
    /// Create a new random candidate ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LLM backends the pipeline knows how to address.
///
/// The serialized names are the identifiers used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendId {
    /// OpenAI GPT-4o
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    /// Anthropic Claude 3.5 Sonnet
    #[serde(rename = "claude-3.5-sonnet")]
    ClaudeSonnet,
    /// Google Gemini 1.5 Pro
    #[serde(rename = "gemini-1.5-pro")]
    GeminiPro,
    /// Mistral Pixtral Large
    #[serde(rename = "pixtral-large-2411")]
    PixtralLarge,
    /// Meta Llama 3.2 90B Vision
    #[serde(rename = "llama-3.2-90b-vision-instruct")]
    LlamaVision,
    /// Qwen 2 VL 72B
    #[serde(rename = "qwen-2-vl-72b-instruct")]
    QwenVision,
    /// Qwen QwQ 32B preview (text only)
    #[serde(rename = "qwq-32b-preview")]
    QwqPreview,
}

impl BackendId {
    /// Every known backend
    pub const ALL: [BackendId; 7] = [
        BackendId::Gpt4o,
        BackendId::ClaudeSonnet,
        BackendId::GeminiPro,
        BackendId::PixtralLarge,
        BackendId::LlamaVision,
        BackendId::QwenVision,
        BackendId::QwqPreview,
    ];

    /// Configuration name of the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::ClaudeSonnet => "claude-3.5-sonnet",
            Self::GeminiPro => "gemini-1.5-pro",
            Self::PixtralLarge => "pixtral-large-2411",
            Self::LlamaVision => "llama-3.2-90b-vision-instruct",
            Self::QwenVision => "qwen-2-vl-72b-instruct",
            Self::QwqPreview => "qwq-32b-preview",
        }
    }

    /// Model slug on OpenRouter
    pub fn openrouter_model(&self) -> &'static str {
        match self {
            Self::Gpt4o => "openai/gpt-4o",
            Self::ClaudeSonnet => "anthropic/claude-3.5-sonnet",
            Self::GeminiPro => "google/gemini-pro-1.5",
            Self::PixtralLarge => "mistralai/pixtral-large-2411",
            Self::LlamaVision => "meta-llama/llama-3.2-90b-vision-instruct",
            Self::QwenVision => "qwen/qwen-2-vl-72b-instruct",
            Self::QwqPreview => "qwen/qwq-32b-preview",
        }
    }

    /// Whether the model accepts image inputs
    pub fn supports_images(&self) -> bool {
        !matches!(self, Self::QwqPreview)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown backend `{}`", s)))
    }
}

/// Sampling behaviour requested from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Low-variance output, used by judges
    Deterministic,
    /// Higher-variance output, used by generators
    Creative,
}

/// Sampling parameters for a single invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sampling {
    /// Sampling mode
    pub mode: SamplingMode,
    /// Maximum tokens for the completion
    pub max_tokens: Option<u32>,
    /// Seed for providers that honour it
    pub seed: Option<u64>,
}

impl Sampling {
    /// Deterministic sampling with provider defaults
    pub fn deterministic() -> Self {
        Self {
            mode: SamplingMode::Deterministic,
            max_tokens: None,
            seed: None,
        }
    }

    /// Creative sampling with provider defaults
    pub fn creative() -> Self {
        Self {
            mode: SamplingMode::Creative,
            max_tokens: None,
            seed: None,
        }
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A fact-checking article as delivered by an article source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactCheckArticle {
    /// The statement that was fact-checked
    pub claim: String,
    /// The fact-checker's conclusion
    pub verdict: String,
    /// Full analysis and evidence
    pub rationale: String,
    /// "If your time is short" summary
    #[serde(default)]
    pub short_summary: Option<String>,
    /// Article headline
    #[serde(default)]
    pub title: Option<String>,
    /// Publication the article comes from
    #[serde(default)]
    pub fact_checker: Option<String>,
    /// Article URL
    #[serde(default)]
    pub url: Option<String>,
}

/// A meme template returned by retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Template identifier understood by the renderer
    pub id: String,
    /// Template title
    pub title: String,
    /// Visual description of the image
    pub description: String,
    /// Explanation of how captions are usually written on it
    pub caption_style: String,
    /// Number of text slots
    pub box_count: usize,
    /// "About" text from Know Your Meme
    #[serde(default)]
    pub about: Option<String>,
    /// Public image URL, sent to multimodal backends
    #[serde(default)]
    pub image_url: Option<String>,
    /// Known caption sets for this template
    #[serde(default)]
    pub examples: Vec<Vec<String>>,
}

impl TemplateRecord {
    /// Create a template with the required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>, box_count: usize) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            box_count,
            ..Default::default()
        }
    }

    /// Parse examples in the dataset's `a; b ||| c; d` form
    pub fn with_examples_str(mut self, raw: &str) -> Self {
        self.examples = raw
            .split("|||")
            .map(|example| {
                example
                    .split(';')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|captions| !captions.is_empty())
            .collect();
        self
    }

    /// Examples that fit into this template's slots
    pub fn usable_examples(&self) -> impl Iterator<Item = &Vec<String>> {
        self.examples.iter().filter(move |e| e.len() <= self.box_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_round_trips_through_name() {
        for backend in BackendId::ALL {
            assert_eq!(backend.as_str().parse::<BackendId>().unwrap(), backend);
        }
        assert!("gpt-5".parse::<BackendId>().is_err());
    }

    #[test]
    fn test_backend_serde_name() {
        let json = serde_json::to_string(&BackendId::ClaudeSonnet).unwrap();
        assert_eq!(json, "\"claude-3.5-sonnet\"");
    }

    #[test]
    fn test_examples_parsing_skips_oversized() {
        let template = TemplateRecord::new("181913649", "Drake Hotline Bling", 2)
            .with_examples_str("old way; new way ||| a; b; c|||  ");
        assert_eq!(template.examples.len(), 2);
        let usable: Vec<_> = template.usable_examples().collect();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0], &vec!["old way".to_string(), "new way".to_string()]);
    }
}
