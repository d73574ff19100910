//! Prompt construction
//!
//! A [`PromptBuilder`] selects a static template by [`PromptKind`] (and
//! [`PromptStep`] for multi-step kinds), builds the dynamic section from the
//! [`PromptContext`] and interpolates `{placeholder}`s. Templates live in YAML;
//! the built-in set is compiled into the crate and can be replaced from a file.

use crate::error::{Error, Result};
use crate::types::{BackendId, FactCheckArticle, TemplateRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

const BUILTIN_TEMPLATES: &str = include_str!("prompts.yaml");

/// Prompt families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptKind {
    /// Instructions only
    ZeroShot,
    /// Instructions plus example captions of the template
    FewShot,
    /// Chain of thought
    Cot,
    /// Chain of verification (multi-step)
    Cov,
    /// Creative leap of thought (multi-step)
    Clot,
    /// Debate round 2: judge scores both generators
    DebateEvaluate,
    /// Debate round 3: generator revises from feedback
    DebateImprovedGeneration,
    /// Debate round 4: judge picks a winner
    DebateFinalEvaluate,
}

impl PromptKind {
    /// Name used in template files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroShot => "zero-shot",
            Self::FewShot => "few-shot",
            Self::Cot => "cot",
            Self::Cov => "cov",
            Self::Clot => "clot",
            Self::DebateEvaluate => "debate-evaluate",
            Self::DebateImprovedGeneration => "debate-improved-generation",
            Self::DebateFinalEvaluate => "debate-final-evaluate",
        }
    }

    /// Ordered steps of a multi-step kind; empty for single-step kinds
    pub fn steps(&self) -> &'static [PromptStep] {
        match self {
            Self::Cov => &[
                PromptStep::Baseline,
                PromptStep::PlanVerification,
                PromptStep::ExecuteVerification,
                PromptStep::FinalResponse,
            ],
            Self::Clot => &[PromptStep::AssociationThinking, PromptStep::SelfRefinement],
            _ => &[],
        }
    }

    /// Whether the kind runs as several dependent calls
    pub fn is_multi_step(&self) -> bool {
        !self.steps().is_empty()
    }

    fn includes_examples(&self) -> bool {
        matches!(
            self,
            Self::FewShot | Self::DebateEvaluate | Self::DebateImprovedGeneration | Self::DebateFinalEvaluate
        )
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the multi-step prompt kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStep {
    /// CoV: first draft of the captions
    Baseline,
    /// CoV: questions that test the draft
    PlanVerification,
    /// CoV: answers to the questions
    ExecuteVerification,
    /// CoV: revised captions
    FinalResponse,
    /// CLoT: brainstormed caption sets with reasoning
    AssociationThinking,
    /// CLoT: refined final captions
    SelfRefinement,
}

impl PromptStep {
    /// Whether the step wants creative sampling
    pub fn is_creative(&self) -> bool {
        matches!(self, Self::Baseline | Self::FinalResponse | Self::AssociationThinking)
    }
}

impl fmt::Display for PromptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Baseline => "baseline",
            Self::PlanVerification => "plan_verification",
            Self::ExecuteVerification => "execute_verification",
            Self::FinalResponse => "final_response",
            Self::AssociationThinking => "association_thinking",
            Self::SelfRefinement => "self_refinement",
        };
        f.write_str(name)
    }
}

/// Article and template fields that can appear in the dynamic section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    /// The fact-checked statement
    Claim,
    /// The fact-checker's conclusion
    Verdict,
    /// "If your time is short" summary
    ShortSummary,
    /// Full analysis
    Rationale,
    /// Article headline
    Title,
    /// Know Your Meme "about" text of the template
    TemplateAbout,
    /// Visual description of the template
    TemplateDescription,
    /// How captions are usually written on the template
    TemplateCaptionStyle,
}

impl ContextField {
    /// Order in which fields are rendered
    pub const ORDER: [ContextField; 8] = [
        ContextField::Claim,
        ContextField::Verdict,
        ContextField::ShortSummary,
        ContextField::Rationale,
        ContextField::Title,
        ContextField::TemplateAbout,
        ContextField::TemplateDescription,
        ContextField::TemplateCaptionStyle,
    ];

    /// One-line description rendered above the value
    pub fn description(&self) -> &'static str {
        match self {
            Self::Claim => "The statement that was fact-checked.",
            Self::Verdict => "The fact-checker's conclusion about the claim's accuracy.",
            Self::ShortSummary => "A brief summary of the key findings of the analysis.",
            Self::Rationale => "The complete analysis and evidence.",
            Self::Title => "The fact-checking article's headline.",
            Self::TemplateAbout => "The meme's about section on Know Your Meme.",
            Self::TemplateDescription => "The visual description of the meme image.",
            Self::TemplateCaptionStyle => "How captions are usually written on this meme image.",
        }
    }

    /// Label that prefixes the value
    pub fn label(&self) -> &'static str {
        match self {
            Self::Claim => "Claim",
            Self::Verdict => "Verdict",
            Self::ShortSummary => "If-your-time-is-short",
            Self::Rationale => "Full rationale",
            Self::Title => "Title",
            Self::TemplateAbout => "Know Your Meme about section",
            Self::TemplateDescription => "Meme image description",
            Self::TemplateCaptionStyle => "Meme image caption style",
        }
    }

    /// Whether the field describes the article (as opposed to the template)
    pub fn is_article_field(&self) -> bool {
        matches!(
            self,
            Self::Claim | Self::Verdict | Self::ShortSummary | Self::Rationale | Self::Title
        )
    }
}

/// CoV intermediate results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationContext {
    /// Captions from the baseline step
    pub baseline: Vec<String>,
    /// Questions from the planning step
    pub questions: Vec<String>,
    /// Answers from the execution step
    pub answers: Vec<String>,
}

/// A CLoT brainstormed caption set
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    /// Captions of the set
    pub captions: Vec<String>,
    /// Why the joke works
    pub reasoning: String,
}

/// Artifacts carried from earlier rounds or steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundArtifacts {
    /// Round-1 captions of generator A
    pub captions_a: Option<Vec<String>>,
    /// Round-1 captions of generator B
    pub captions_b: Option<Vec<String>>,
    /// The generator's own previous captions (round 3)
    pub previous_captions: Option<Vec<String>>,
    /// The generator's own formatted feedback (round 3)
    pub feedback: Option<String>,
    /// Round-3 captions of generator A
    pub improved_a: Option<Vec<String>>,
    /// Round-3 captions of generator B
    pub improved_b: Option<Vec<String>>,
    /// CoV context
    pub verification: VerificationContext,
    /// CLoT context
    pub associations: Vec<Association>,
}

/// Everything a prompt may draw from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    fields: BTreeMap<ContextField, String>,
    /// Name of the fact-checking outlet
    pub fact_checker: Option<String>,
    /// Target template
    pub template: Option<TemplateRecord>,
    /// Prior-round artifacts
    pub round: RoundArtifacts,
}

impl PromptContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from an article, keeping only `allowed` article fields
    ///
    /// `None` keeps every field.
    pub fn from_article(article: &FactCheckArticle, allowed: Option<&[ContextField]>) -> Self {
        let keep = |field: ContextField| allowed.map_or(true, |a| a.contains(&field));

        let mut ctx = Self::new();
        ctx.fact_checker = article.fact_checker.clone();
        let candidates = [
            (ContextField::Claim, Some(&article.claim)),
            (ContextField::Verdict, Some(&article.verdict)),
            (ContextField::ShortSummary, article.short_summary.as_ref()),
            (ContextField::Rationale, Some(&article.rationale)),
            (ContextField::Title, article.title.as_ref()),
        ];
        for (field, value) in candidates {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                if keep(field) {
                    ctx.fields.insert(field, value.clone());
                }
            }
        }
        ctx
    }

    /// Set a field
    pub fn with_field(mut self, field: ContextField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Value of a field
    pub fn field(&self, field: ContextField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Attach the target template and its descriptive fields
    pub fn with_template(mut self, template: TemplateRecord) -> Self {
        let describe = [
            (ContextField::TemplateAbout, template.about.clone()),
            (ContextField::TemplateDescription, Some(template.description.clone())),
            (ContextField::TemplateCaptionStyle, Some(template.caption_style.clone())),
        ];
        for (field, value) in describe {
            match value.filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    self.fields.insert(field, value);
                }
                None => {
                    self.fields.remove(&field);
                }
            }
        }
        self.template = Some(template);
        self
    }

    /// Required number of captions, when a template is attached
    pub fn box_count(&self) -> Option<usize> {
        self.template.as_ref().map(|t| t.box_count)
    }

    /// Context for the round-2 judge
    pub fn with_debate_captions(mut self, a: Vec<String>, b: Vec<String>) -> Self {
        self.round.captions_a = Some(a);
        self.round.captions_b = Some(b);
        self
    }

    /// Context for a round-3 revision
    pub fn with_revision(mut self, previous: Vec<String>, feedback: String) -> Self {
        self.round.previous_captions = Some(previous);
        self.round.feedback = Some(feedback);
        self
    }

    /// Context for the round-4 judge
    pub fn with_improved_captions(mut self, a: Vec<String>, b: Vec<String>) -> Self {
        self.round.improved_a = Some(a);
        self.round.improved_b = Some(b);
        self
    }

    /// Context for a CoV step
    pub fn with_verification(mut self, verification: VerificationContext) -> Self {
        self.round.verification = verification;
        self
    }

    /// Context for the CLoT refinement step
    pub fn with_associations(mut self, associations: Vec<Association>) -> Self {
        self.round.associations = associations;
        self
    }
}

/// Final prompt text plus image references
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    /// Prompt text
    pub text: String,
    /// Image URLs, empty when none apply
    pub images: Vec<String>,
}

/// Render captions as `Caption N: text` lines
pub fn format_caption_lines(captions: &[String]) -> String {
    if captions.is_empty() {
        return "(no captions)".to_string();
    }
    captions
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Caption {}: {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TemplateEntry {
    Single(String),
    Steps(BTreeMap<PromptStep, String>),
}

/// Registry of prompt templates
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    entries: HashMap<PromptKind, TemplateEntry>,
}

impl PromptTemplates {
    /// The templates shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_TEMPLATES)
    }

    /// Parse templates from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let entries: HashMap<PromptKind, TemplateEntry> = serde_yaml::from_str(yaml)?;
        Ok(Self { entries })
    }

    /// Load templates from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    fn template(&self, kind: PromptKind, step: Option<PromptStep>) -> Result<&str> {
        let entry = self
            .entries
            .get(&kind)
            .ok_or_else(|| Error::validation(format!("no template for prompt kind `{}`", kind)))?;

        match (entry, step) {
            (TemplateEntry::Single(text), None) => Ok(text),
            (TemplateEntry::Steps(steps), Some(step)) => steps
                .get(&step)
                .map(String::as_str)
                .ok_or_else(|| Error::validation(format!("prompt kind `{}` has no step `{}`", kind, step))),
            (TemplateEntry::Single(_), Some(step)) => Err(Error::validation(format!(
                "prompt kind `{}` is single-step but step `{}` was requested",
                kind, step
            ))),
            (TemplateEntry::Steps(_), None) => Err(Error::validation(format!(
                "prompt kind `{}` needs a step",
                kind
            ))),
        }
    }
}

/// Builds prompts from templates and context
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    templates: PromptTemplates,
    max_examples: usize,
}

impl PromptBuilder {
    /// Create a builder over the given templates
    pub fn new(templates: PromptTemplates) -> Self {
        Self {
            templates,
            max_examples: 5,
        }
    }

    /// Builder over the built-in templates
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(PromptTemplates::builtin()?))
    }

    /// Limit the number of template examples shown
    pub fn with_max_examples(mut self, max_examples: usize) -> Self {
        self.max_examples = max_examples;
        self
    }

    /// Build the prompt for one call
    pub fn build(
        &self,
        kind: PromptKind,
        step: Option<PromptStep>,
        ctx: &PromptContext,
        backend: BackendId,
    ) -> Result<Prompt> {
        let template = self.templates.template(kind, step)?;
        let values = self.placeholder_values(kind, ctx);
        let text = interpolate(template, &values)?;

        let images = match (&ctx.template, backend.supports_images()) {
            (Some(TemplateRecord { image_url: Some(url), .. }), true) => vec![url.clone()],
            _ => Vec::new(),
        };

        Ok(Prompt { text, images })
    }

    fn placeholder_values(&self, kind: PromptKind, ctx: &PromptContext) -> HashMap<&'static str, String> {
        let mut values = HashMap::new();
        values.insert("dynamic_section", self.dynamic_section(kind, ctx));
        values.insert(
            "fact_checker",
            ctx.fact_checker.clone().unwrap_or_else(|| "the fact-checker".to_string()),
        );

        if let Some(template) = &ctx.template {
            values.insert("box_count", template.box_count.to_string());
            values.insert("template_name", template.title.clone());
        }

        let round = &ctx.round;
        let captions = [
            ("captions1", &round.captions_a),
            ("captions2", &round.captions_b),
            ("previous_captions", &round.previous_captions),
            ("improved_captions1", &round.improved_a),
            ("improved_captions2", &round.improved_b),
        ];
        for (name, value) in captions {
            if let Some(value) = value {
                values.insert(name, format_caption_lines(value));
            }
        }
        if let Some(feedback) = &round.feedback {
            values.insert("feedback", feedback.clone());
        }
        values
    }

    fn dynamic_section(&self, kind: PromptKind, ctx: &PromptContext) -> String {
        let mut parts = Vec::new();

        if kind.is_multi_step() {
            parts.push("ARTICLE AND MEME TEMPLATE INFORMATION:".to_string());
        }

        for field in ContextField::ORDER {
            if let Some(value) = ctx.field(field) {
                parts.push(format!("# {}", field.description()));
                parts.push(format!("{}: {}", field.label(), value));
            }
        }

        if kind.includes_examples() {
            if let Some(template) = &ctx.template {
                let examples: Vec<_> = template.usable_examples().take(self.max_examples).collect();
                if !examples.is_empty() {
                    parts.push(String::new());
                    parts.push("Here are some examples of how this meme template is typically used:".to_string());
                    for (i, example) in examples.iter().enumerate() {
                        parts.push(format!("Example {}:", i + 1));
                        for (j, caption) in example.iter().enumerate() {
                            parts.push(format!("\tCaption {}: {}", j + 1, caption));
                        }
                    }
                }
            }
        }

        match kind {
            PromptKind::Cov => push_verification_blocks(&mut parts, &ctx.round.verification),
            PromptKind::Clot => {
                for (i, association) in ctx.round.associations.iter().enumerate() {
                    parts.push(format!("Example {}:", i + 1));
                    for (j, caption) in association.captions.iter().enumerate() {
                        parts.push(format!("Caption {}: {}", j + 1, caption));
                    }
                    parts.push(format!("Reasoning: {}", association.reasoning));
                }
            }
            _ => {}
        }

        parts.join("\n")
    }
}

fn push_verification_blocks(parts: &mut Vec<String>, verification: &VerificationContext) {
    if !verification.baseline.is_empty() {
        parts.push(String::new());
        parts.push("INITIAL CAPTIONS:".to_string());
        for (i, caption) in verification.baseline.iter().enumerate() {
            parts.push(format!("Caption {}: {}", i + 1, caption));
        }
    }

    if verification.answers.is_empty() {
        if !verification.questions.is_empty() {
            parts.push(String::new());
            parts.push("VERIFICATION QUESTIONS:".to_string());
            for (i, question) in verification.questions.iter().enumerate() {
                parts.push(format!("Question {}: {}", i + 1, question));
            }
        }
    } else {
        parts.push(String::new());
        parts.push("VERIFICATION QUESTIONS AND ANSWERS:".to_string());
        for (i, answer) in verification.answers.iter().enumerate() {
            let question = verification.questions.get(i).map(String::as_str).unwrap_or("(missing)");
            parts.push(format!("Question {}: {}", i + 1, question));
            parts.push(format!("Answer {}: {}", i + 1, answer));
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z0-9_]+)\}").expect("valid placeholder regex"))
}

fn interpolate(template: &str, values: &HashMap<&'static str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = values.get(name.as_str()).ok_or_else(|| {
            Error::validation(format!("placeholder `{{{}}}` has no value in this context", name.as_str()))
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn article() -> FactCheckArticle {
        FactCheckArticle {
            claim: "Windmills cause cancer".to_string(),
            verdict: "Pants on Fire".to_string(),
            rationale: "No study links wind turbines to cancer.".to_string(),
            short_summary: Some("There is no evidence.".to_string()),
            title: Some("No, windmills do not cause cancer".to_string()),
            fact_checker: Some("PolitiFact".to_string()),
            url: None,
        }
    }

    fn drake() -> TemplateRecord {
        TemplateRecord {
            id: "181913649".to_string(),
            title: "Drake Hotline Bling".to_string(),
            description: "Drake rejecting one thing and approving another".to_string(),
            caption_style: "Top: rejected option. Bottom: preferred option.".to_string(),
            box_count: 2,
            about: None,
            image_url: Some("https://i.imgflip.com/30b1gx.jpg".to_string()),
            examples: vec![
                vec!["Doing homework".to_string(), "Copying homework".to_string()],
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
            ],
        }
    }

    #[test]
    fn test_dynamic_section_uses_fixed_order_and_skips_absent() {
        let ctx = PromptContext::new()
            .with_field(ContextField::Title, "Headline")
            .with_field(ContextField::Claim, "The claim")
            .with_field(ContextField::Verdict, "False");
        let builder = PromptBuilder::builtin().unwrap();

        let section = builder.dynamic_section(PromptKind::ZeroShot, &ctx);
        let claim = section.find("Claim: The claim").unwrap();
        let verdict = section.find("Verdict: False").unwrap();
        let title = section.find("Title: Headline").unwrap();
        assert!(claim < verdict && verdict < title);
        assert!(!section.contains("Full rationale"));
        assert!(section.starts_with("# The statement that was fact-checked."));
    }

    #[test]
    fn test_ablation_restricts_article_fields() {
        let ctx = PromptContext::from_article(&article(), Some(&[ContextField::Claim, ContextField::Verdict]));
        assert_eq!(ctx.field(ContextField::Claim), Some("Windmills cause cancer"));
        assert_eq!(ctx.field(ContextField::Rationale), None);
        assert_eq!(ctx.field(ContextField::Title), None);
    }

    #[test]
    fn test_few_shot_prompt_with_image_and_examples() {
        let ctx = PromptContext::from_article(&article(), None).with_template(drake());
        let prompt = PromptBuilder::builtin()
            .unwrap()
            .build(PromptKind::FewShot, None, &ctx, BackendId::Gpt4o)
            .unwrap();

        assert!(prompt.text.contains("Drake Hotline Bling"));
        assert!(prompt.text.contains("exactly 2 captions"));
        assert!(prompt.text.contains("Example 1:\n\tCaption 1: Doing homework"));
        // the three-caption example does not fit a two-slot template
        assert!(!prompt.text.contains("Example 2:"));
        assert!(prompt.text.contains("Meme image caption style: Top: rejected option."));
        assert_eq!(prompt.images, vec!["https://i.imgflip.com/30b1gx.jpg".to_string()]);
    }

    #[test]
    fn test_no_image_for_text_only_backend_or_missing_url() {
        let builder = PromptBuilder::builtin().unwrap();
        let ctx = PromptContext::from_article(&article(), None).with_template(drake());
        let prompt = builder.build(PromptKind::ZeroShot, None, &ctx, BackendId::QwqPreview).unwrap();
        assert!(prompt.images.is_empty());

        let mut template = drake();
        template.image_url = None;
        let ctx = PromptContext::from_article(&article(), None).with_template(template);
        let prompt = builder.build(PromptKind::ZeroShot, None, &ctx, BackendId::Gpt4o).unwrap();
        assert!(prompt.images.is_empty());
    }

    #[test]
    fn test_debate_evaluate_embeds_both_caption_sets() {
        let ctx = PromptContext::from_article(&article(), None)
            .with_template(drake())
            .with_debate_captions(vec!["A".into(), "B".into()], vec![]);
        let prompt = PromptBuilder::builtin()
            .unwrap()
            .build(PromptKind::DebateEvaluate, None, &ctx, BackendId::GeminiPro)
            .unwrap();

        assert!(prompt.text.contains("Generator 1:\nCaption 1: A\nCaption 2: B"));
        assert!(prompt.text.contains("Generator 2:\n(no captions)"));
        assert!(prompt.text.contains("template_appropriateness"));
    }

    #[test]
    fn test_missing_round_artifacts_is_validation_error() {
        let ctx = PromptContext::from_article(&article(), None).with_template(drake());
        let err = PromptBuilder::builtin()
            .unwrap()
            .build(PromptKind::DebateFinalEvaluate, None, &ctx, BackendId::GeminiPro)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_step_mismatch_is_validation_error() {
        let builder = PromptBuilder::builtin().unwrap();
        let ctx = PromptContext::from_article(&article(), None).with_template(drake());
        assert!(builder.build(PromptKind::Cov, None, &ctx, BackendId::Gpt4o).is_err());
        assert!(builder
            .build(PromptKind::FewShot, Some(PromptStep::Baseline), &ctx, BackendId::Gpt4o)
            .is_err());
        assert!(builder
            .build(PromptKind::Clot, Some(PromptStep::Baseline), &ctx, BackendId::Gpt4o)
            .is_err());
    }

    #[test]
    fn test_cov_blocks_follow_verification_progress() {
        let builder = PromptBuilder::builtin().unwrap();
        let base = PromptContext::from_article(&article(), None).with_template(drake());

        let planning = base.clone().with_verification(VerificationContext {
            baseline: vec!["x".into(), "y".into()],
            questions: vec!["Is x accurate?".into()],
            answers: vec![],
        });
        let prompt = builder
            .build(PromptKind::Cov, Some(PromptStep::ExecuteVerification), &planning, BackendId::Gpt4o)
            .unwrap();
        assert!(prompt.text.contains("ARTICLE AND MEME TEMPLATE INFORMATION:"));
        assert!(prompt.text.contains("INITIAL CAPTIONS:\nCaption 1: x\nCaption 2: y"));
        assert!(prompt.text.contains("VERIFICATION QUESTIONS:\nQuestion 1: Is x accurate?"));

        let answered = base.with_verification(VerificationContext {
            baseline: vec!["x".into(), "y".into()],
            questions: vec!["Is x accurate?".into()],
            answers: vec!["Yes".into()],
        });
        let prompt = builder
            .build(PromptKind::Cov, Some(PromptStep::FinalResponse), &answered, BackendId::Gpt4o)
            .unwrap();
        assert!(prompt.text.contains("VERIFICATION QUESTIONS AND ANSWERS:\nQuestion 1: Is x accurate?\nAnswer 1: Yes"));
        assert!(!prompt.text.contains("VERIFICATION QUESTIONS:\n"));
    }

    #[test]
    fn test_clot_refinement_lists_associations() {
        let ctx = PromptContext::from_article(&article(), None)
            .with_template(drake())
            .with_associations(vec![Association {
                captions: vec!["p".into(), "q".into()],
                reasoning: "contrast".into(),
            }]);
        let prompt = PromptBuilder::builtin()
            .unwrap()
            .build(PromptKind::Clot, Some(PromptStep::SelfRefinement), &ctx, BackendId::Gpt4o)
            .unwrap();
        assert!(prompt.text.contains("Example 1:\nCaption 1: p\nCaption 2: q\nReasoning: contrast"));
    }

    #[test]
    fn test_values_are_not_reinterpolated() {
        let ctx = PromptContext::new()
            .with_field(ContextField::Claim, "{box_count} {unknown}")
            .with_template(drake());
        let prompt = PromptBuilder::builtin()
            .unwrap()
            .build(PromptKind::ZeroShot, None, &ctx, BackendId::Gpt4o)
            .unwrap();
        assert!(prompt.text.contains("Claim: {box_count} {unknown}"));
    }

    #[test]
    fn test_templates_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "zero-shot: \"Slots: {{box_count}}\\n{{dynamic_section}}\"\ncov:\n  baseline: \"B {{template_name}}\"\n"
        )
        .unwrap();

        let builder = PromptBuilder::new(PromptTemplates::from_file(file.path()).unwrap());
        let ctx = PromptContext::new().with_field(ContextField::Claim, "c").with_template(drake());
        let prompt = builder.build(PromptKind::ZeroShot, None, &ctx, BackendId::Gpt4o).unwrap();
        assert!(prompt.text.starts_with("Slots: 2\n"));

        let prompt = builder
            .build(PromptKind::Cov, Some(PromptStep::Baseline), &ctx, BackendId::Gpt4o)
            .unwrap();
        assert_eq!(prompt.text, "B Drake Hotline Bling");
        assert!(builder.build(PromptKind::FewShot, None, &ctx, BackendId::Gpt4o).is_err());
    }

    #[test]
    fn test_builtin_templates_cover_every_kind() {
        let templates = PromptTemplates::builtin().unwrap();
        let kinds = [
            PromptKind::ZeroShot,
            PromptKind::FewShot,
            PromptKind::Cot,
            PromptKind::DebateEvaluate,
            PromptKind::DebateImprovedGeneration,
            PromptKind::DebateFinalEvaluate,
        ];
        for kind in kinds {
            assert!(templates.template(kind, None).is_ok(), "{}", kind);
        }
        for kind in [PromptKind::Cov, PromptKind::Clot] {
            for step in kind.steps() {
                assert!(templates.template(kind, Some(*step)).is_ok(), "{} {}", kind, step);
            }
        }
    }
}
