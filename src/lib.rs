//! # memefact
//!
//! Turns fact-checking articles into captioned memes with LLMs acting as both
//! caption writers and judges.
//!
//! ## Features
//!
//! - **Debate generation**: two generators write captions, a judge critiques
//!   them, each generator revises from its own critique, the judge decides
//! - **One gateway for every backend**: OpenRouter, Anthropic and local vLLM
//!   behind a single retrying, rate-limited [`ModelGateway`]
//! - **Prompt registry**: zero-shot, few-shot, chain-of-thought,
//!   chain-of-verification and creative leap-of-thought templates in YAML
//! - **Bounded moderation**: unsafe batches are regenerated a limited number
//!   of times
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memefact::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MemeFactConfig::load(None)?;
//!     let client = Arc::new(OpenRouterClient::from_env()?);
//!     let gateway = ModelGateway::new(BackendRegistry::all_via(client), config.gateway.clone());
//!     let generator = CaptionGenerator::new(Arc::new(gateway), Arc::new(PromptBuilder::builtin()?));
//!     let debate = DebateCoordinator::new(generator, config.debate.clone());
//!
//!     let article = FactCheckArticle {
//!         claim: "Windmills cause cancer".into(),
//!         verdict: "Pants on Fire".into(),
//!         rationale: "No study links wind turbines to cancer.".into(),
//!         ..Default::default()
//!     };
//!     let ctx = PromptContext::from_article(&article, None)
//!         .with_template(TemplateRecord::new("181913649", "Drake Hotline Bling", 2));
//!
//!     let outcome = debate.run_debate(&ctx).await?;
//!     println!("{:?}", outcome.captions);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anthropic;
pub mod candidate;
pub mod config;
pub mod debate;
pub mod error;
pub mod gateway;
pub mod generation;
pub mod imgflip;
pub mod llm_client;
pub mod mock;
pub mod moderation;
pub mod openrouter;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod types;
pub mod vllm;

// Re-exports for convenience
pub use anthropic::AnthropicClient;
pub use candidate::Candidate;
pub use config::{
    AnthropicConfig, DebateConfig, GatewayConfig, ImgFlipConfig, MemeFactConfig, OpenRouterConfig,
    PipelineConfig, RetryPolicy, SamplingPolicy, Variant,
};
pub use debate::{DebateCoordinator, DebateOutcome, DebateSession};
pub use error::{Error, Result};
pub use gateway::{BackendRegistry, ModelGateway};
pub use generation::CaptionGenerator;
pub use imgflip::ImgFlipRenderer;
pub use llm_client::LlmClient;
pub use moderation::{ModerationGate, SafetyClassifier};
pub use openrouter::{CompletionRequest, CompletionResponse, Message, OpenRouterClient};
pub use parser::{Criterion, EvaluationFeedback, FeedbackPair, FinalVerdict, GeneratorSlot, Winner};
pub use pipeline::{CaptionPipeline, ImageRenderer, TemplateRetriever};
pub use prompt::{ContextField, Prompt, PromptBuilder, PromptContext, PromptKind, PromptStep, PromptTemplates};
pub use types::{BackendId, CandidateId, FactCheckArticle, RunId, Sampling, SamplingMode, TemplateRecord};
pub use vllm::{VllmClient, VllmConfig};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::candidate::Candidate;
    pub use crate::config::{MemeFactConfig, Variant};
    pub use crate::debate::{DebateCoordinator, DebateOutcome};
    pub use crate::error::{Error, Result};
    pub use crate::gateway::{BackendRegistry, ModelGateway};
    pub use crate::generation::CaptionGenerator;
    pub use crate::openrouter::OpenRouterClient;
    pub use crate::pipeline::CaptionPipeline;
    pub use crate::prompt::{PromptBuilder, PromptContext, PromptKind};
    pub use crate::types::{BackendId, FactCheckArticle, TemplateRecord};
}
