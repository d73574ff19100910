//! Debate coordinator
//!
//! Two generators write captions, a judge critiques both, each generator
//! revises from its own critique and the judge picks a winner:
//!
//! 1. generators A and B, few-shot, creative, concurrently
//! 2. judge scores both sets, deterministic
//! 3. A and B revise from their own feedback, creative, concurrently
//! 4. judge scores the revisions and decides, deterministic
//!
//! Rounds never overlap. A failing generator degrades to an empty caption set;
//! malformed judge output fails the run.

use crate::config::DebateConfig;
use crate::error::{Error, Result};
use crate::generation::CaptionGenerator;
use crate::parser::{self, FeedbackPair, FinalVerdict, GeneratorSlot};
use crate::prompt::{PromptContext, PromptKind};
use crate::types::{BackendId, RunId, Sampling, SamplingMode};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Timing of one model call within a debate
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    /// Round number, 1 to 4
    pub round: u8,
    /// `generator_1`, `generator_2` or `judge`
    pub role: &'static str,
    /// Backend that answered
    pub backend: BackendId,
    /// Wall time of the call
    pub elapsed_ms: u64,
    /// Whether the call produced a usable answer
    pub succeeded: bool,
}

/// Everything one debate produced
#[derive(Debug, Clone)]
pub struct DebateSession {
    /// Run identifier
    pub run_id: RunId,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Round-1 captions of generator A
    pub captions_a: Vec<String>,
    /// Round-1 captions of generator B
    pub captions_b: Vec<String>,
    /// Round-2 judgment
    pub feedback: Option<FeedbackPair>,
    /// Round-3 captions of generator A
    pub improved_a: Vec<String>,
    /// Round-3 captions of generator B
    pub improved_b: Vec<String>,
    /// Round-4 judgment
    pub verdict: Option<FinalVerdict>,
    /// One record per model call
    pub records: Vec<RoundRecord>,
}

impl DebateSession {
    fn new() -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            captions_a: Vec::new(),
            captions_b: Vec::new(),
            feedback: None,
            improved_a: Vec::new(),
            improved_b: Vec::new(),
            verdict: None,
            records: Vec::new(),
        }
    }

    fn record(&mut self, round: u8, role: &'static str, backend: BackendId, started: Instant, succeeded: bool) {
        self.records.push(RoundRecord {
            round,
            role,
            backend,
            elapsed_ms: started.elapsed().as_millis() as u64,
            succeeded,
        });
    }

    /// Total time spent in model calls
    pub fn total_elapsed_ms(&self) -> u64 {
        self.records.iter().map(|r| r.elapsed_ms).sum()
    }
}

/// Result of a debate run
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    /// The winning captions
    pub captions: Vec<String>,
    /// Intermediate results of every round
    pub session: DebateSession,
}

/// Runs the four-round debate protocol
#[derive(Clone)]
pub struct DebateCoordinator {
    generator: CaptionGenerator,
    roster: DebateConfig,
}

impl DebateCoordinator {
    /// Create a coordinator for the given roster
    pub fn new(generator: CaptionGenerator, roster: DebateConfig) -> Self {
        Self { generator, roster }
    }

    /// The debate roster
    pub fn roster(&self) -> &DebateConfig {
        &self.roster
    }

    /// Run one debate and return the judge's winning captions
    #[instrument(skip_all, fields(
        generator_a = %self.roster.generator_a,
        generator_b = %self.roster.generator_b,
        judge = %self.roster.judge
    ))]
    pub async fn run_debate(&self, ctx: &PromptContext) -> Result<DebateOutcome> {
        let mut session = DebateSession::new();
        let (backend_a, backend_b) = (self.roster.generator_a, self.roster.generator_b);
        info!(run_id = %session.run_id, "debate started");

        // Round 1
        let started = Instant::now();
        let (a, b) = futures::join!(
            self.generate_or_empty(backend_a, PromptKind::FewShot, ctx, 1),
            self.generate_or_empty(backend_b, PromptKind::FewShot, ctx, 1)
        );
        let (captions_a, captions_b) = (a?, b?);
        session.record(1, "generator_1", backend_a, started, !captions_a.is_empty());
        session.record(1, "generator_2", backend_b, started, !captions_b.is_empty());

        // Round 2
        let started = Instant::now();
        let evaluation_ctx = ctx
            .clone()
            .with_debate_captions(captions_a.clone(), captions_b.clone());
        let feedback = self
            .judge(PromptKind::DebateEvaluate, &evaluation_ctx)
            .await
            .and_then(|raw| parser::parse_feedback(&raw));
        session.record(2, "judge", self.roster.judge, started, feedback.is_ok());
        let feedback = feedback?;
        info!(round = 2, "feedback parsed");

        // Round 3
        let started = Instant::now();
        let revise_a = ctx.clone().with_revision(
            captions_a.clone(),
            parser::format_feedback(feedback.for_slot(GeneratorSlot::First)),
        );
        let revise_b = ctx.clone().with_revision(
            captions_b.clone(),
            parser::format_feedback(feedback.for_slot(GeneratorSlot::Second)),
        );
        let (a, b) = futures::join!(
            self.generate_or_empty(backend_a, PromptKind::DebateImprovedGeneration, &revise_a, 3),
            self.generate_or_empty(backend_b, PromptKind::DebateImprovedGeneration, &revise_b, 3)
        );
        let (improved_a, improved_b) = (a?, b?);
        session.record(3, "generator_1", backend_a, started, !improved_a.is_empty());
        session.record(3, "generator_2", backend_b, started, !improved_b.is_empty());

        session.captions_a = captions_a;
        session.captions_b = captions_b;
        session.feedback = Some(feedback);

        // Round 4
        let started = Instant::now();
        let final_ctx = ctx
            .clone()
            .with_improved_captions(improved_a.clone(), improved_b.clone());
        let verdict = self
            .judge(PromptKind::DebateFinalEvaluate, &final_ctx)
            .await
            .and_then(|raw| parser::parse_final(&raw))
            .and_then(|verdict| check_winner(verdict, &improved_a, &improved_b));
        session.record(4, "judge", self.roster.judge, started, verdict.is_ok());
        let verdict = verdict?;

        info!(
            run_id = %session.run_id,
            winner = %verdict.winner.generator,
            confidence = verdict.winner.confidence,
            average_1 = verdict.generator_1.average,
            average_2 = verdict.generator_2.average,
            "debate decided"
        );

        let captions = verdict.winner.captions.clone();
        session.improved_a = improved_a;
        session.improved_b = improved_b;
        session.verdict = Some(verdict);

        Ok(DebateOutcome { captions, session })
    }

    async fn judge(&self, kind: PromptKind, ctx: &PromptContext) -> Result<String> {
        let judge = self.roster.judge;
        let prompt = self.generator.prompts().build(kind, None, ctx, judge)?;
        self.generator
            .gateway()
            .invoke(judge, &prompt, Sampling::deterministic())
            .await
    }

    /// Generate captions, degrading any model failure to an empty set.
    ///
    /// Prompt and registry errors are configuration mistakes and still fail.
    async fn generate_or_empty(
        &self,
        backend: BackendId,
        kind: PromptKind,
        ctx: &PromptContext,
        round: u8,
    ) -> Result<Vec<String>> {
        match self.generator.generate(backend, kind, ctx, SamplingMode::Creative).await {
            Ok(captions) => Ok(captions),
            Err(e @ Error::Validation(_)) => Err(e),
            Err(e) => {
                warn!(round, backend = %backend, error = %e, "generator failed, continuing with no captions");
                Ok(Vec::new())
            }
        }
    }
}

/// The winning captions must be the named generator's revised set
fn check_winner(verdict: FinalVerdict, improved_a: &[String], improved_b: &[String]) -> Result<FinalVerdict> {
    let expected = match verdict.winner.generator {
        GeneratorSlot::First => improved_a,
        GeneratorSlot::Second => improved_b,
    };
    if normalize(&verdict.winner.captions) == normalize(expected) {
        Ok(verdict)
    } else {
        Err(Error::parse(
            "output.decision.winning_captions",
            format!("winning captions are not {}'s revised captions", verdict.winner.generator),
        ))
    }
}

fn normalize(captions: &[String]) -> Vec<String> {
    captions
        .iter()
        .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RetryPolicy};
    use crate::gateway::{BackendRegistry, ModelGateway};
    use crate::mock::{ScriptedClient, ScriptedReply};
    use crate::prompt::{ContextField, PromptBuilder};
    use crate::types::TemplateRecord;
    use std::sync::Arc;

    const FEEDBACK: &str = r#"output:
  generator_1:
    scores:
      coherence: 3/5
      clarity: 3/5
      hilarity: 2/5
      persuasiveness: 3/5
      template_appropriateness: 3/5
    strengths:
      - "Uses the template correctly"
    improvements:
      - "GEN-ONE-FIX"
  generator_2:
    scores:
      coherence: 4/5
      clarity: 4/5
      hilarity: 4/5
      persuasiveness: 4/5
      template_appropriateness: 4/5
    strengths:
      - "Funny contrast"
    improvements:
      - "GEN-TWO-FIX"
  synthesis:
    combinations: []
"#;

    const VERDICT: &str = r#"output:
  generator_1:
    scores:
      coherence: 3.5/5
      clarity: 3.5/5
      hilarity: 3/5
      persuasiveness: 4/5
      template_appropriateness: 3.5/5
    average: 3.5/5
  generator_2:
    scores:
      coherence: 4/5
      clarity: 4.5/5
      hilarity: 4/5
      persuasiveness: 4.5/5
      template_appropriateness: 4/5
    average: 4.2/5
  decision:
    winning_generator: generator_2
    confidence: 82%
    winning_captions:
      - "C revised"
      - "D revised"
    explanation: "Generator 2 lands the joke and the verdict."
"#;

    struct Fixture {
        coordinator: DebateCoordinator,
        gen_a: Arc<ScriptedClient>,
        gen_b: Arc<ScriptedClient>,
        judge: Arc<ScriptedClient>,
    }

    fn fixture(gen_a: Vec<ScriptedReply>, gen_b: Vec<ScriptedReply>, judge: Vec<&str>) -> Fixture {
        let gen_a = Arc::new(ScriptedClient::from_replies(gen_a));
        let gen_b = Arc::new(ScriptedClient::from_replies(gen_b));
        let judge = Arc::new(ScriptedClient::new(judge));

        let registry = BackendRegistry::new()
            .register(BackendId::Gpt4o, gen_a.clone())
            .register(BackendId::ClaudeSonnet, gen_b.clone())
            .register(BackendId::GeminiPro, judge.clone());
        let config = GatewayConfig {
            retry: RetryPolicy::none(),
            ..Default::default()
        };
        let generator = CaptionGenerator::new(
            Arc::new(ModelGateway::new(registry, config)),
            Arc::new(PromptBuilder::builtin().unwrap()),
        );

        Fixture {
            coordinator: DebateCoordinator::new(generator, DebateConfig::default()),
            gen_a,
            gen_b,
            judge,
        }
    }

    fn text(s: &str) -> ScriptedReply {
        ScriptedReply::Text(s.to_string())
    }

    fn context() -> PromptContext {
        PromptContext::new()
            .with_field(ContextField::Claim, "Windmills cause cancer")
            .with_field(ContextField::Verdict, "Pants on Fire")
            .with_template(TemplateRecord::new("181913649", "Drake Hotline Bling", 2))
    }

    #[tokio::test]
    async fn test_generator_two_wins_with_revised_captions() {
        let f = fixture(
            vec![
                text("Caption 1: A\nCaption 2: B"),
                text("output:\n  captions:\n    1: \"A revised\"\n    2: \"B revised\"\n"),
            ],
            vec![
                text("Caption 1: C\nCaption 2: D"),
                text("output:\n  captions:\n    1: \"C revised\"\n    2: \"D revised\"\n"),
            ],
            vec![FEEDBACK, VERDICT],
        );

        let outcome = f.coordinator.run_debate(&context()).await.unwrap();
        assert_eq!(outcome.captions, vec!["C revised", "D revised"]);

        let session = &outcome.session;
        assert_eq!(session.captions_a, vec!["A", "B"]);
        assert_eq!(session.captions_b, vec!["C", "D"]);
        assert_eq!(session.improved_b, vec!["C revised", "D revised"]);
        let verdict = session.verdict.as_ref().unwrap();
        assert_eq!(verdict.winner.generator, GeneratorSlot::Second);
        assert!((verdict.winner.confidence - 82.0).abs() < 1e-9);
        assert_eq!(session.records.len(), 6);
        assert!(session.records.iter().all(|r| r.succeeded));

        assert_eq!(f.gen_a.call_count(), 2);
        assert_eq!(f.gen_b.call_count(), 2);
        assert_eq!(f.judge.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rounds_see_the_right_artifacts() {
        let f = fixture(
            vec![
                text("Caption 1: A\nCaption 2: B"),
                text("output:\n  captions:\n    1: \"A revised\"\n    2: \"B revised\"\n"),
            ],
            vec![
                text("Caption 1: C\nCaption 2: D"),
                text("output:\n  captions:\n    1: \"C revised\"\n    2: \"D revised\"\n"),
            ],
            vec![FEEDBACK, VERDICT],
        );
        f.coordinator.run_debate(&context()).await.unwrap();

        let judge_requests = f.judge.requests();
        let evaluation = judge_requests[0].user_text();
        assert!(evaluation.contains("Generator 1:\nCaption 1: A\nCaption 2: B"));
        assert!(evaluation.contains("Generator 2:\nCaption 1: C\nCaption 2: D"));
        assert_eq!(judge_requests[0].temperature, Some(0.2));

        let final_round = judge_requests[1].user_text();
        assert!(final_round.contains("Caption 1: C revised\nCaption 2: D revised"));
        assert!(!final_round.contains("Caption 1: C\n"));

        // each generator revises from its own feedback
        let revision_a = f.gen_a.requests()[1].user_text();
        let revision_b = f.gen_b.requests()[1].user_text();
        assert!(revision_a.contains("GEN-ONE-FIX") && !revision_a.contains("GEN-TWO-FIX"));
        assert!(revision_b.contains("GEN-TWO-FIX") && !revision_b.contains("GEN-ONE-FIX"));
        assert!(revision_b.contains("Caption 1: C\nCaption 2: D"));
        assert_eq!(f.gen_b.requests()[1].temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_debate_is_deterministic_for_fixed_replies() {
        let run = || async {
            let f = fixture(
                vec![text("Caption 1: A\nCaption 2: B"), text("Caption 1: A revised\nCaption 2: B revised")],
                vec![text("Caption 1: C\nCaption 2: D"), text("Caption 1: C revised\nCaption 2: D revised")],
                vec![FEEDBACK, VERDICT],
            );
            f.coordinator.run_debate(&context()).await.unwrap().captions
        };
        let first = run().await;
        for _ in 0..3 {
            assert_eq!(run().await, first);
        }
    }

    #[tokio::test]
    async fn test_failed_generator_degrades_to_empty() {
        let f = fixture(
            vec![
                ScriptedReply::Failure("upstream 500".into()),
                text("output:\n  captions:\n    1: \"A fresh\"\n    2: \"B fresh\"\n"),
            ],
            vec![
                text("Caption 1: C\nCaption 2: D"),
                text("output:\n  captions:\n    1: \"C revised\"\n    2: \"D revised\"\n"),
            ],
            vec![FEEDBACK, VERDICT],
        );

        let outcome = f.coordinator.run_debate(&context()).await.unwrap();
        assert_eq!(outcome.captions, vec!["C revised", "D revised"]);
        assert!(outcome.session.captions_a.is_empty());
        assert!(!outcome.session.records[0].succeeded);
        assert!(f.judge.requests()[0].user_text().contains("Generator 1:\n(no captions)"));
    }

    #[tokio::test]
    async fn test_missing_decision_fails_the_run() {
        let broken = VERDICT.split("  decision:").next().unwrap().to_string();
        let f = fixture(
            vec![text("Caption 1: A\nCaption 2: B")],
            vec![text("Caption 1: C\nCaption 2: D")],
            vec![FEEDBACK, broken.as_str()],
        );

        match f.coordinator.run_debate(&context()).await.unwrap_err() {
            Error::Parse { section, .. } => assert_eq!(section, "output.decision"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.judge.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_feedback_stops_before_revision() {
        let f = fixture(
            vec![text("Caption 1: A\nCaption 2: B")],
            vec![text("Caption 1: C\nCaption 2: D")],
            vec!["The captions are both fine."],
        );

        let err = f.coordinator.run_debate(&context()).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(f.gen_a.call_count(), 1);
        assert_eq!(f.judge.call_count(), 1);
    }

    #[tokio::test]
    async fn test_winner_must_match_a_revised_set() {
        let f = fixture(
            vec![text("Caption 1: A\nCaption 2: B"), text("Caption 1: A2\nCaption 2: B2")],
            vec![text("Caption 1: C\nCaption 2: D"), text("Caption 1: C2\nCaption 2: D2")],
            vec![FEEDBACK, VERDICT],
        );

        let err = f.coordinator.run_debate(&context()).await.unwrap_err();
        assert!(matches!(err, Error::Parse { section, .. } if section == "output.decision.winning_captions"));
    }

    #[tokio::test]
    async fn test_winning_captions_must_belong_to_named_generator() {
        // names generator_2 but quotes generator_1's revision
        let swapped = VERDICT.replace("\"C revised\"", "\"A revised\"").replace("\"D revised\"", "\"B revised\"");
        let f = fixture(
            vec![text("Caption 1: A\nCaption 2: B"), text("Caption 1: A revised\nCaption 2: B revised")],
            vec![text("Caption 1: C\nCaption 2: D"), text("Caption 1: C revised\nCaption 2: D revised")],
            vec![FEEDBACK, swapped.as_str()],
        );

        let err = f.coordinator.run_debate(&context()).await.unwrap_err();
        match err {
            Error::Parse { section, message } => {
                assert_eq!(section, "output.decision.winning_captions");
                assert!(message.contains("generator_2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_revision_degrades_to_empty() {
        let f = fixture(
            vec![text("Caption 1: A\nCaption 2: B"), ScriptedReply::Failure("upstream 502".into())],
            vec![text("Caption 1: C\nCaption 2: D"), text("Caption 1: C revised\nCaption 2: D revised")],
            vec![FEEDBACK, VERDICT],
        );

        let outcome = f.coordinator.run_debate(&context()).await.unwrap();
        assert_eq!(outcome.captions, vec!["C revised", "D revised"]);

        let session = &outcome.session;
        assert_eq!(session.captions_a, vec!["A", "B"]);
        assert!(session.improved_a.is_empty());
        assert_eq!(session.records[3].round, 3);
        assert_eq!(session.records[3].role, "generator_1");
        assert!(!session.records[3].succeeded);
        assert!(session.records[4].succeeded);

        let final_round = f.judge.requests()[1].user_text();
        assert!(final_round.contains("Generator 1:\n(no captions)"));
        assert!(final_round.contains("Caption 1: C revised\nCaption 2: D revised"));
    }
}
