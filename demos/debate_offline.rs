//! Offline debate example using scripted model replies
//!
//! Runs the full pipeline (debate variant, moderation on) without network
//! access: every backend is a `ScriptedClient` and rendering is faked.
//!
//! ```bash
//! RUST_LOG=memefact=debug cargo run --example debate_offline
//! ```

use async_trait::async_trait;
use memefact::mock::ScriptedClient;
use memefact::prelude::*;
use memefact::{DebateConfig, ImageRenderer, ModerationGate, PipelineConfig, SafetyClassifier, TemplateRetriever};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const FEEDBACK: &str = r#"output:
  generator_1:
    scores: {coherence: 3/5, clarity: 3/5, hilarity: 2/5, persuasiveness: 3/5, template_appropriateness: 3/5}
    strengths: ["States the verdict"]
    improvements: ["Make the contrast funnier"]
  generator_2:
    scores: {coherence: 4/5, clarity: 4/5, hilarity: 4/5, persuasiveness: 4/5, template_appropriateness: 4/5}
    strengths: ["Strong contrast"]
    improvements: ["Mention the evidence"]
  synthesis:
    combinations: ["Generator 2's top line with generator 1's verdict"]
"#;

const VERDICT: &str = r#"output:
  generator_1:
    scores: {coherence: 3.5/5, clarity: 3.5/5, hilarity: 3/5, persuasiveness: 4/5, template_appropriateness: 3.5/5}
    average: 3.5/5
  generator_2:
    scores: {coherence: 4/5, clarity: 4.5/5, hilarity: 4/5, persuasiveness: 4.5/5, template_appropriateness: 4/5}
    average: 4.2/5
  decision:
    winning_generator: generator_2
    confidence: 82%
    winning_captions:
      - "Windmills cause cancer"
      - "Decades of studies: no they don't"
    explanation: "Sharper contrast that still carries the verdict."
"#;

struct OneTemplate;

#[async_trait]
impl TemplateRetriever for OneTemplate {
    async fn query(
        &self,
        _template_id: Option<&str>,
        _text_query: Option<&FactCheckArticle>,
        _k: usize,
    ) -> Result<Vec<TemplateRecord>> {
        let mut drake = TemplateRecord::new("181913649", "Drake Hotline Bling", 2)
            .with_examples_str("Doing homework; Copying homework ||| Stairs; Escalator");
        drake.description = "Drake rejecting one thing and approving another".to_string();
        drake.caption_style = "Top: the rejected option. Bottom: the preferred option.".to_string();
        Ok(vec![drake])
    }
}

struct FakeRenderer;

#[async_trait]
impl ImageRenderer for FakeRenderer {
    async fn render(&self, template: &TemplateRecord, captions: &[String]) -> Result<String> {
        Ok(format!("https://render.invalid/{}/{}.jpg", template.id, captions.len()))
    }
}

struct AllowAll;

#[async_trait]
impl SafetyClassifier for AllowAll {
    fn id(&self) -> &str {
        "allow_all"
    }

    async fn is_unsafe(&self, _url: &str) -> Result<bool> {
        Ok(false)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memefact=info")))
        .init();

    println!("=== MemeFact Offline Debate ===\n");

    let registry = BackendRegistry::new()
        .register(
            BackendId::Gpt4o,
            Arc::new(
                ScriptedClient::new([
                    "Caption 1: Windmills\nCaption 2: Cancer",
                    "Caption 1: Wind turbines\nCaption 2: Not a health risk",
                ])
                .with_name("gpt-4o (scripted)"),
            ),
        )
        .register(
            BackendId::ClaudeSonnet,
            Arc::new(
                ScriptedClient::new([
                    "Caption 1: Windmills cause cancer\nCaption 2: Science says no",
                    "output:\n  captions:\n    1: \"Windmills cause cancer\"\n    2: \"Decades of studies: no they don't\"\n",
                ])
                .with_name("claude (scripted)"),
            ),
        )
        .register(
            BackendId::GeminiPro,
            Arc::new(ScriptedClient::new([FEEDBACK, VERDICT]).with_name("gemini (scripted)")),
        );

    let gateway = ModelGateway::new(registry, Default::default());
    let generator = CaptionGenerator::new(Arc::new(gateway), Arc::new(PromptBuilder::builtin()?));

    let pipeline = CaptionPipeline::new(
        PipelineConfig {
            variant: Variant::Debate,
            enable_moderation: true,
            ..Default::default()
        },
        DebateConfig::default(),
        generator,
        Arc::new(FakeRenderer),
    )
    .with_retriever(Arc::new(OneTemplate))
    .with_moderation(ModerationGate::new(Arc::new(AllowAll)));

    let article = FactCheckArticle {
        claim: "Wind turbines cause cancer".into(),
        verdict: "Pants on Fire".into(),
        rationale: "There is no scientific evidence that wind turbines cause cancer.".into(),
        short_summary: Some("No study links wind turbines to cancer.".into()),
        fact_checker: Some("PolitiFact".into()),
        ..Default::default()
    };

    let candidates = pipeline.run(&article).await?;

    for candidate in &candidates {
        println!("✓ {} ({})", candidate.template.title, candidate.id);
        for (i, caption) in candidate.captions.iter().enumerate() {
            println!("  Caption {}: {}", i + 1, caption);
        }
        println!("  URL: {}", candidate.url.as_deref().unwrap_or("-"));
        println!("  Safe: {:?}", candidate.safety().map(|flagged| !flagged));
    }

    Ok(())
}
