//! Caption pipeline
//!
//! One [`CaptionPipeline::produce`] call runs a bounded loop of
//! generate → validate → render → moderate. A batch with any flagged
//! candidate is discarded as a whole; recoverable generation failures also
//! cost an attempt. When the attempt budget runs out the caller gets
//! [`Error::RetriesExhausted`], never a partial batch.

use crate::candidate::Candidate;
use crate::config::{DebateConfig, MemeFactConfig, PipelineConfig, Variant};
use crate::debate::DebateCoordinator;
use crate::error::{Error, Result};
use crate::generation::CaptionGenerator;
use crate::moderation::ModerationGate;
use crate::prompt::{ContextField, PromptContext, PromptKind};
use crate::types::{BackendId, FactCheckArticle, SamplingMode, TemplateRecord};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Finds meme templates for an article
#[async_trait]
pub trait TemplateRetriever: Send + Sync {
    /// Up to `k` templates, by id and/or by similarity to the article
    async fn query(
        &self,
        template_id: Option<&str>,
        text_query: Option<&FactCheckArticle>,
        k: usize,
    ) -> Result<Vec<TemplateRecord>>;
}

/// Renders captions onto a template
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    /// URL of the rendered meme
    async fn render(&self, template: &TemplateRecord, captions: &[String]) -> Result<String>;
}

/// Produces moderated meme candidates for an article
pub struct CaptionPipeline {
    config: PipelineConfig,
    generator: CaptionGenerator,
    debate: DebateCoordinator,
    renderer: Arc<dyn ImageRenderer>,
    retriever: Option<Arc<dyn TemplateRetriever>>,
    moderation: ModerationGate,
    templates: Vec<TemplateRecord>,
    ablation: Option<Vec<ContextField>>,
}

impl CaptionPipeline {
    /// Create a pipeline; moderation starts disabled
    pub fn new(
        config: PipelineConfig,
        roster: DebateConfig,
        generator: CaptionGenerator,
        renderer: Arc<dyn ImageRenderer>,
    ) -> Self {
        let debate = DebateCoordinator::new(generator.clone(), roster);
        Self {
            config,
            generator,
            debate,
            renderer,
            retriever: None,
            moderation: ModerationGate::disabled(),
            templates: Vec::new(),
            ablation: None,
        }
    }

    /// Create a pipeline from the full configuration, applying its ablation
    pub fn from_config(
        config: &MemeFactConfig,
        generator: CaptionGenerator,
        renderer: Arc<dyn ImageRenderer>,
    ) -> Result<Self> {
        let pipeline = Self::new(config.pipeline.clone(), config.debate.clone(), generator, renderer);
        match (config.pipeline.ablation.as_str(), config.ablation_fields()) {
            (_, Some(fields)) => Ok(pipeline.with_ablation(fields.to_vec())),
            ("default", None) => Ok(pipeline),
            (name, None) => Err(Error::validation(format!("unknown ablation `{}`", name))),
        }
    }

    /// Use a template retriever (RAG and debate variants)
    pub fn with_retriever(mut self, retriever: Arc<dyn TemplateRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Fixed templates for the baseline variant
    pub fn with_templates(mut self, templates: Vec<TemplateRecord>) -> Self {
        self.templates = templates;
        self
    }

    /// Moderate rendered candidates with the given gate
    pub fn with_moderation(mut self, moderation: ModerationGate) -> Self {
        self.config.enable_moderation = moderation.is_enabled();
        self.moderation = moderation;
        self
    }

    /// Restrict the article fields shown to the models
    pub fn with_ablation(mut self, fields: Vec<ContextField>) -> Self {
        self.ablation = Some(fields);
        self
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce moderated candidates using the configured candidate count,
    /// backend and prompt kind
    pub async fn run(&self, article: &FactCheckArticle) -> Result<Vec<Candidate>> {
        let PipelineConfig {
            num_candidates,
            backend,
            prompt_kind,
            ..
        } = self.config;
        self.produce(article, num_candidates, backend, prompt_kind).await
    }

    /// Produce `num_candidates` moderated candidates for the article
    ///
    /// `backend` and `kind` drive baseline and RAG generation; the debate
    /// variant uses its roster and debate prompts instead.
    #[instrument(skip_all, fields(variant = ?self.config.variant, num_candidates = num_candidates, backend = %backend, kind = %kind))]
    pub async fn produce(
        &self,
        article: &FactCheckArticle,
        num_candidates: usize,
        backend: BackendId,
        kind: PromptKind,
    ) -> Result<Vec<Candidate>> {
        self.validate(num_candidates)?;

        let base = PromptContext::from_article(article, self.ablation.as_deref());
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(article, &base, num_candidates, backend, kind).await {
                Ok(batch) => {
                    let flagged = batch.iter().filter(|c| c.is_flagged()).count();
                    if flagged == 0 {
                        info!(attempt, candidates = batch.len(), "batch accepted");
                        return Ok(batch);
                    }
                    warn!(attempt, flagged, "batch rejected by moderation, regenerating");
                    last_error = format!("{} of {} candidates flagged unsafe", flagged, batch.len());
                }
                Err(e) if e.is_recoverable() => {
                    warn!(attempt, error = %e, "attempt failed, regenerating");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    fn validate(&self, num_candidates: usize) -> Result<()> {
        if num_candidates == 0 {
            return Err(Error::validation("num_candidates must be at least 1"));
        }
        if self.config.enable_moderation && !self.moderation.is_enabled() {
            return Err(Error::validation("moderation is enabled but no safety classifier is configured"));
        }
        match self.config.variant {
            Variant::Baseline if self.templates.is_empty() => {
                Err(Error::validation("the baseline variant needs at least one template"))
            }
            Variant::Rag | Variant::Debate if self.retriever.is_none() => Err(Error::validation(format!(
                "the {:?} variant needs a template retriever",
                self.config.variant
            ))),
            _ => Ok(()),
        }
    }

    async fn attempt(
        &self,
        article: &FactCheckArticle,
        base: &PromptContext,
        num_candidates: usize,
        backend: BackendId,
        kind: PromptKind,
    ) -> Result<Vec<Candidate>> {
        let templates = self.select_templates(article, num_candidates).await?;
        debug!(templates = templates.len(), "templates selected");

        let generations = templates.into_iter().map(|template| async move {
            let ctx = base.clone().with_template(template.clone());
            let captions = self.generate(&ctx, backend, kind).await?;
            if captions.len() != template.box_count {
                return Err(Error::parse(
                    "captions",
                    format!(
                        "template `{}` has {} slots but {} captions were generated",
                        template.title,
                        template.box_count,
                        captions.len()
                    ),
                ));
            }
            let url = self.renderer.render(&template, &captions).await?;
            Ok::<_, Error>(Candidate::new(template, captions).with_url(url))
        });

        let candidates = join_all(generations).await.into_iter().collect::<Result<Vec<_>>>()?;
        if self.config.enable_moderation {
            self.moderation.check(candidates).await
        } else {
            Ok(candidates)
        }
    }

    async fn generate(&self, ctx: &PromptContext, backend: BackendId, kind: PromptKind) -> Result<Vec<String>> {
        match self.config.variant {
            Variant::Debate => Ok(self.debate.run_debate(ctx).await?.captions),
            Variant::Baseline | Variant::Rag => {
                self.generator.generate(backend, kind, ctx, SamplingMode::Creative).await
            }
        }
    }

    async fn select_templates(&self, article: &FactCheckArticle, num_candidates: usize) -> Result<Vec<TemplateRecord>> {
        match self.config.variant {
            Variant::Baseline => Ok(match self.templates.as_slice() {
                [only] => vec![only.clone(); num_candidates],
                many => many.to_vec(),
            }),
            Variant::Rag | Variant::Debate => {
                let retriever = self
                    .retriever
                    .as_ref()
                    .ok_or_else(|| Error::validation("no template retriever configured"))?;
                let templates = retriever.query(None, Some(article), num_candidates).await?;
                if templates.is_empty() {
                    return Err(Error::empty("retriever returned no templates"));
                }
                Ok(templates)
            }
        }
    }
}
