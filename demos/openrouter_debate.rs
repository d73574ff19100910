//! Live debate over OpenRouter, rendered on ImgFlip
//!
//! # Prerequisites
//!
//! ```bash
//! export OPENROUTER_API_KEY=...
//! export IMG_FLIP_API_USERNAME=...
//! export IMG_FLIP_API_PASSWORD=...
//! ```
//!
//! Optional: `MEMEFACT_CONFIG=memefact.yaml` and `MEMEFACT__*` overrides, e.g.
//! `MEMEFACT__DEBATE__JUDGE=claude-3.5-sonnet`.
//!
//! ```bash
//! cargo run --example openrouter_debate
//! ```

use memefact::prelude::*;
use memefact::{ImageRenderer, ImgFlipRenderer, PromptTemplates};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memefact=info")))
        .init();

    println!("=== MemeFact Debate over OpenRouter ===\n");

    let config_path = std::env::var("MEMEFACT_CONFIG").ok().map(PathBuf::from);
    let config = MemeFactConfig::load(config_path.as_deref())?;
    println!(
        "✓ Roster: {} vs {}, judged by {}",
        config.debate.generator_a, config.debate.generator_b, config.debate.judge
    );

    let client = Arc::new(OpenRouterClient::from_env()?);
    let gateway = ModelGateway::new(BackendRegistry::all_via(client), config.gateway.clone());
    let templates = match &config.prompts_path {
        Some(path) => PromptTemplates::from_file(path)?,
        None => PromptTemplates::builtin()?,
    };
    let generator = CaptionGenerator::new(Arc::new(gateway), Arc::new(PromptBuilder::new(templates)));
    let debate = DebateCoordinator::new(generator, config.debate.clone());

    let renderer = ImgFlipRenderer::from_env()?;
    let template = renderer
        .popular_templates()
        .await?
        .into_iter()
        .find(|t| t.id == "181913649")
        .ok_or_else(|| anyhow::anyhow!("Drake Hotline Bling is not among the popular templates"))?;
    println!("✓ Template: {} ({} slots)", template.title, template.box_count);

    let article = FactCheckArticle {
        claim: "Wind turbines cause cancer".into(),
        verdict: "Pants on Fire".into(),
        rationale: "There is no scientific evidence that the noise or electromagnetic fields \
                    from wind turbines cause cancer."
            .into(),
        short_summary: Some("No study links wind turbines to cancer.".into()),
        title: Some("No, wind turbines do not cause cancer".into()),
        fact_checker: Some("PolitiFact".into()),
        url: None,
    };
    let ctx = PromptContext::from_article(&article, config.ablation_fields()).with_template(template.clone());

    println!("\n🤖 Debating...\n");
    let outcome = debate.run_debate(&ctx).await?;

    if let Some(verdict) = &outcome.session.verdict {
        println!(
            "📊 Averages: generator 1 {:.1}/5, generator 2 {:.1}/5",
            verdict.generator_1.average, verdict.generator_2.average
        );
        println!(
            "🏆 Winner: {} ({}% confident)\n   {}",
            verdict.winner.generator, verdict.winner.confidence, verdict.winner.explanation
        );
    }
    for (i, caption) in outcome.captions.iter().enumerate() {
        println!("  Caption {}: {}", i + 1, caption);
    }

    let url = renderer.render(&template, &outcome.captions).await?;
    println!("\n✅ Meme: {}", url);
    println!("   Model time: {} ms", outcome.session.total_elapsed_ms());

    Ok(())
}
