//! Caption generation strategies
//!
//! Single-shot kinds are one gateway call followed by caption extraction.
//! Chain of verification and creative leap of thought run their steps in
//! order, feeding each step's extracted lines into the next step's context.

use crate::error::{Error, Result};
use crate::gateway::ModelGateway;
use crate::parser;
use crate::prompt::{PromptBuilder, PromptContext, PromptKind, PromptStep, VerificationContext};
use crate::types::{BackendId, Sampling, SamplingMode};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Produces captions for one backend and prompt kind
#[derive(Clone)]
pub struct CaptionGenerator {
    gateway: Arc<ModelGateway>,
    prompts: Arc<PromptBuilder>,
}

impl CaptionGenerator {
    /// Create a generator over a shared gateway and prompt builder
    pub fn new(gateway: Arc<ModelGateway>, prompts: Arc<PromptBuilder>) -> Self {
        Self { gateway, prompts }
    }

    /// The underlying gateway
    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    /// The prompt builder
    pub fn prompts(&self) -> &Arc<PromptBuilder> {
        &self.prompts
    }

    /// Generate a caption list
    ///
    /// `mode` applies to single-shot kinds; multi-step kinds pick the mode per
    /// step.
    #[instrument(skip_all, fields(backend = %backend, kind = %kind))]
    pub async fn generate(
        &self,
        backend: BackendId,
        kind: PromptKind,
        ctx: &PromptContext,
        mode: SamplingMode,
    ) -> Result<Vec<String>> {
        match kind {
            PromptKind::Cov => self.chain_of_verification(backend, ctx).await,
            PromptKind::Clot => self.leap_of_thought(backend, ctx).await,
            _ => {
                let raw = self.call(backend, kind, None, ctx, mode).await?;
                parser::extract_captions(&raw)
            }
        }
    }

    async fn call(
        &self,
        backend: BackendId,
        kind: PromptKind,
        step: Option<PromptStep>,
        ctx: &PromptContext,
        mode: SamplingMode,
    ) -> Result<String> {
        let prompt = self.prompts.build(kind, step, ctx, backend)?;
        let sampling = match mode {
            SamplingMode::Creative => Sampling::creative(),
            SamplingMode::Deterministic => Sampling::deterministic(),
        };
        self.gateway.invoke(backend, &prompt, sampling).await
    }

    async fn step(&self, backend: BackendId, kind: PromptKind, step: PromptStep, ctx: &PromptContext) -> Result<String> {
        let mode = if step.is_creative() {
            SamplingMode::Creative
        } else {
            SamplingMode::Deterministic
        };
        debug!(%step, "running step");
        self.call(backend, kind, Some(step), ctx, mode).await
    }

    async fn chain_of_verification(&self, backend: BackendId, ctx: &PromptContext) -> Result<Vec<String>> {
        let kind = PromptKind::Cov;

        let raw = self.step(backend, kind, PromptStep::Baseline, ctx).await?;
        let baseline = parser::extract_captions(&raw)?;

        let mut verification = VerificationContext {
            baseline,
            ..Default::default()
        };
        let planning = ctx.clone().with_verification(verification.clone());
        let raw = self.step(backend, kind, PromptStep::PlanVerification, &planning).await?;
        verification.questions = non_empty(parser::extract_prefixed(&raw, "Question"), "verification questions")?;

        let executing = ctx.clone().with_verification(verification.clone());
        let raw = self.step(backend, kind, PromptStep::ExecuteVerification, &executing).await?;
        verification.answers = non_empty(parser::extract_prefixed(&raw, "Answer"), "verification answers")?;

        let finishing = ctx.clone().with_verification(verification);
        let raw = self.step(backend, kind, PromptStep::FinalResponse, &finishing).await?;
        parser::extract_captions(&raw)
    }

    async fn leap_of_thought(&self, backend: BackendId, ctx: &PromptContext) -> Result<Vec<String>> {
        let kind = PromptKind::Clot;

        let raw = self.step(backend, kind, PromptStep::AssociationThinking, ctx).await?;
        parser::detect_refusal(&raw)?;
        let associations = parser::extract_associations(&raw);
        if associations.is_empty() {
            return Err(Error::empty("no associations with reasoning"));
        }
        debug!(count = associations.len(), "associations collected");

        let refining = ctx.clone().with_associations(associations);
        let raw = self.step(backend, kind, PromptStep::SelfRefinement, &refining).await?;
        parser::extract_captions(&raw)
    }
}

fn non_empty(lines: Vec<String>, what: &str) -> Result<Vec<String>> {
    if lines.is_empty() {
        Err(Error::empty(format!("no {}", what)))
    } else {
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RetryPolicy};
    use crate::gateway::BackendRegistry;
    use crate::mock::ScriptedClient;
    use crate::types::TemplateRecord;

    fn context() -> PromptContext {
        PromptContext::new()
            .with_field(crate::prompt::ContextField::Claim, "5G spreads viruses")
            .with_field(crate::prompt::ContextField::Verdict, "False")
            .with_template(TemplateRecord::new("87743020", "Two Buttons", 2))
    }

    fn generator(client: Arc<ScriptedClient>) -> CaptionGenerator {
        let config = GatewayConfig {
            retry: RetryPolicy::none(),
            ..Default::default()
        };
        let gateway = ModelGateway::new(BackendRegistry::new().register(BackendId::Gpt4o, client), config);
        CaptionGenerator::new(Arc::new(gateway), Arc::new(PromptBuilder::builtin().unwrap()))
    }

    #[tokio::test]
    async fn test_single_shot() {
        let client = Arc::new(ScriptedClient::constant("Caption 1: Radio waves\nCaption 2: Not viruses"));
        let captions = generator(client.clone())
            .generate(BackendId::Gpt4o, PromptKind::ZeroShot, &context(), SamplingMode::Creative)
            .await
            .unwrap();
        assert_eq!(captions, vec!["Radio waves", "Not viruses"]);
        assert_eq!(client.requests()[0].temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_chain_of_verification_feeds_each_step() {
        let client = Arc::new(ScriptedClient::new([
            "Caption 1: 5G towers\nCaption 2: Spread flu",
            "Question 1: Does 5G carry viruses?",
            "Answer 1: No, radio waves cannot carry viruses.",
            "Caption 1: 5G towers\nCaption 2: Spread bars, not viruses",
        ]));
        let captions = generator(client.clone())
            .generate(BackendId::Gpt4o, PromptKind::Cov, &context(), SamplingMode::Deterministic)
            .await
            .unwrap();
        assert_eq!(captions, vec!["5G towers", "Spread bars, not viruses"]);

        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        let temperatures: Vec<_> = requests.iter().map(|r| r.temperature).collect();
        assert_eq!(temperatures, vec![Some(0.7), Some(0.2), Some(0.2), Some(0.7)]);
        assert!(requests[1].user_text().contains("INITIAL CAPTIONS:\nCaption 1: 5G towers"));
        assert!(requests[2].user_text().contains("Question 1: Does 5G carry viruses?"));
        assert!(requests[3].user_text().contains("Answer 1: No, radio waves cannot carry viruses."));
    }

    #[tokio::test]
    async fn test_chain_of_verification_without_questions_is_recoverable() {
        let client = Arc::new(ScriptedClient::new(["Caption 1: a\nCaption 2: b", "Nothing to verify."]));
        let err = generator(client)
            .generate(BackendId::Gpt4o, PromptKind::Cov, &context(), SamplingMode::Creative)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResult(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_leap_of_thought() {
        let client = Arc::new(ScriptedClient::new([
            "Caption 1: Me\nCaption 2: 5G\nReasoning: blame shifting\nCaption 1: Flu\nCaption 2: Towers\nReasoning: absurd pairing",
            "Caption 1: Flu season\nCaption 2: Blaming the tower",
        ]));
        let captions = generator(client.clone())
            .generate(BackendId::Gpt4o, PromptKind::Clot, &context(), SamplingMode::Creative)
            .await
            .unwrap();
        assert_eq!(captions, vec!["Flu season", "Blaming the tower"]);
        let refinement = client.requests()[1].user_text();
        assert!(refinement.contains("Reasoning: blame shifting"));
        assert!(refinement.contains("Example 2:"));
    }

    #[tokio::test]
    async fn test_refusal_propagates() {
        let client = Arc::new(ScriptedClient::constant("I cannot provide that."));
        let err = generator(client)
            .generate(BackendId::Gpt4o, PromptKind::FewShot, &context(), SamplingMode::Creative)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Refusal(_)));
    }
}
