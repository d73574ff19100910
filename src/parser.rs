//! Parsing of generator and judge output
//!
//! Generators answer with `Caption N: text` lines or a YAML `output.captions`
//! block. The judge answers with YAML rooted at `output`. Missing sections and
//! out-of-range values are reported as [`Error::Parse`] naming the section;
//! refusals are reported as [`Error::Refusal`] before any structure is read.

use crate::error::{Error, Result};
use crate::prompt::Association;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

const REFUSAL_PHRASES: &[&str] = &[
    "i'm sorry, but i can't",
    "i don't have information about",
    "i'm not able to",
    "i cannot provide",
    "i'm not comfortable",
    "i don't have access to",
    "i'm not authorized to",
];

/// Only a refusal when the response opens with them; captions say these too.
const OPENING_REFUSALS: &[&str] = &["i can't", "i cannot"];

const FEEDBACK_HEADER: &str = "Here's the evaluation of your previous captions:\n\n";

/// Judging criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Criterion {
    /// Captions fit together logically
    Coherence,
    /// The fact-check's message is easy to grasp
    Clarity,
    /// The meme is funny
    Hilarity,
    /// The meme moves readers toward the verdict
    Persuasiveness,
    /// Captions use the template the way it is meant to be used
    TemplateAppropriateness,
}

impl Criterion {
    /// Every criterion, in report order
    pub const ALL: [Criterion; 5] = [
        Criterion::Coherence,
        Criterion::Clarity,
        Criterion::Hilarity,
        Criterion::Persuasiveness,
        Criterion::TemplateAppropriateness,
    ];

    /// Key used in judge output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coherence => "coherence",
            Self::Clarity => "clarity",
            Self::Hilarity => "hilarity",
            Self::Persuasiveness => "persuasiveness",
            Self::TemplateAppropriateness => "template_appropriateness",
        }
    }

    /// Human-readable name
    pub fn title(&self) -> &'static str {
        match self {
            Self::Coherence => "Coherence",
            Self::Clarity => "Clarity",
            Self::Hilarity => "Hilarity",
            Self::Persuasiveness => "Persuasiveness",
            Self::TemplateAppropriateness => "Template Appropriateness",
        }
    }

    /// Match a key ignoring case, spaces, dashes and underscores
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized: String = key
            .chars()
            .filter(|c| !matches!(*c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().replace('_', "") == normalized)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round-2 feedback for one generator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationFeedback {
    /// Integer score 1..=5 per criterion
    pub scores: BTreeMap<Criterion, u8>,
    /// What worked
    pub strengths: Vec<String>,
    /// What to change
    pub improvements: Vec<String>,
}

impl EvaluationFeedback {
    /// Score for a criterion
    pub fn score(&self, criterion: Criterion) -> Option<u8> {
        self.scores.get(&criterion).copied()
    }
}

/// Round-2 feedback for both generators
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackPair {
    /// Feedback for generator A
    pub generator_1: EvaluationFeedback,
    /// Feedback for generator B
    pub generator_2: EvaluationFeedback,
    /// Suggested caption combinations, informational only
    pub combinations: Vec<String>,
}

impl FeedbackPair {
    /// Feedback addressed to the given generator
    pub fn for_slot(&self, slot: GeneratorSlot) -> &EvaluationFeedback {
        match slot {
            GeneratorSlot::First => &self.generator_1,
            GeneratorSlot::Second => &self.generator_2,
        }
    }
}

/// Which debate generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorSlot {
    /// Generator A
    First,
    /// Generator B
    Second,
}

impl GeneratorSlot {
    /// Key used in judge output
    pub fn key(&self) -> &'static str {
        match self {
            Self::First => "generator_1",
            Self::Second => "generator_2",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        let digits: String = label.chars().filter(char::is_ascii_digit).collect();
        match digits.as_str() {
            "1" => Some(Self::First),
            "2" => Some(Self::Second),
            _ => None,
        }
    }
}

impl fmt::Display for GeneratorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Round-4 scores for one generator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorScores {
    /// Score per criterion, out of 5
    pub scores: BTreeMap<Criterion, f64>,
    /// Average reported by the judge
    pub average: f64,
}

/// The judge's decision
#[derive(Debug, Clone, PartialEq)]
pub struct Winner {
    /// Winning generator
    pub generator: GeneratorSlot,
    /// Percentage in `[0, 100]`
    pub confidence: f64,
    /// The winning captions, as written by the judge
    pub captions: Vec<String>,
    /// The judge's reasoning
    pub explanation: String,
}

/// Parsed round-4 judgment
#[derive(Debug, Clone, PartialEq)]
pub struct FinalVerdict {
    /// Scores of generator A's revision
    pub generator_1: GeneratorScores,
    /// Scores of generator B's revision
    pub generator_2: GeneratorScores,
    /// The decision
    pub winner: Winner,
}

/// Fail with [`Error::Refusal`] when the text matches a known refusal phrase
pub fn detect_refusal(text: &str) -> Result<()> {
    let lowered = text.replace('\u{2019}', "'").to_lowercase();
    let opening = lowered.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`'));

    let found = REFUSAL_PHRASES
        .iter()
        .find(|phrase| contains_phrase(&lowered, phrase))
        .or_else(|| {
            OPENING_REFUSALS
                .iter()
                .find(|phrase| opening.starts_with(*phrase) && at_word_end(&opening[phrase.len()..]))
        });
    match found {
        Some(phrase) => Err(Error::Refusal(format!("response contains \"{}\"", phrase))),
        None => Ok(()),
    }
}

/// Whole-word occurrence of `phrase` in `text`
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(start, _)| {
        let starts_word = text[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        starts_word && at_word_end(&text[start + phrase.len()..])
    })
}

fn at_word_end(rest: &str) -> bool {
    rest.chars().next().map_or(true, |c| !c.is_alphanumeric())
}

/// Extract an ordered caption list from generator output
pub fn extract_captions(raw: &str) -> Result<Vec<String>> {
    detect_refusal(raw)?;

    if let Some(output) = load_output(raw) {
        let captions = child(&output, "captions", "output.captions")?;
        let list = caption_values(captions)?;
        if list.is_empty() {
            return Err(Error::parse("output.captions", "no captions listed"));
        }
        return Ok(list);
    }

    let captions: Vec<String> = caption_line_regex()
        .captures_iter(raw)
        .filter_map(|caps| caps.get(2))
        .map(|m| strip_quotes(m.as_str()))
        .filter(|c| !c.is_empty())
        .collect();

    if captions.is_empty() {
        return Err(Error::empty("no captions found in model output"));
    }
    Ok(captions)
}

/// Values of `Prefix N: text` lines, in order of appearance
pub fn extract_prefixed(raw: &str, prefix: &str) -> Vec<String> {
    let pattern = format!(
        r"(?im)^\s*(?:[-*]\s*)?\**{}\s*\d*\**\s*:\**\s*(.+?)\s*$",
        regex::escape(prefix)
    );
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1))
            .map(|m| strip_quotes(m.as_str()))
            .filter(|v| !v.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Group `Caption N:` lines into sets closed by a `Reasoning:` line
pub fn extract_associations(raw: &str) -> Vec<Association> {
    let mut associations = Vec::new();
    let mut current = Vec::new();

    for line in raw.lines() {
        if let Some(caps) = caption_line_regex().captures(line) {
            if let Some(text) = caps.get(2) {
                current.push(strip_quotes(text.as_str()));
            }
        } else if let Some(reasoning) = extract_prefixed(line, "Reasoning").into_iter().next() {
            if !current.is_empty() {
                associations.push(Association {
                    captions: std::mem::take(&mut current),
                    reasoning,
                });
            }
        }
    }
    associations
}

/// Parse round-2 judge output
pub fn parse_feedback(raw: &str) -> Result<FeedbackPair> {
    let output = load_output(raw).ok_or_else(|| Error::parse("output", "missing top-level `output` key"))?;

    let generator_1 = parse_evaluation(&output, GeneratorSlot::First)?;
    let generator_2 = parse_evaluation(&output, GeneratorSlot::Second)?;
    let combinations = output
        .get("synthesis")
        .and_then(|s| s.get("combinations"))
        .map(string_list)
        .unwrap_or_default();

    Ok(FeedbackPair {
        generator_1,
        generator_2,
        combinations,
    })
}

/// Parse round-4 judge output
pub fn parse_final(raw: &str) -> Result<FinalVerdict> {
    let output = load_output(raw).ok_or_else(|| Error::parse("output", "missing top-level `output` key"))?;

    let generator_1 = parse_final_scores(&output, GeneratorSlot::First)?;
    let generator_2 = parse_final_scores(&output, GeneratorSlot::Second)?;

    let decision = child(&output, "decision", "output.decision")?;

    let label = scalar_text(child(decision, "winning_generator", "output.decision.winning_generator")?)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::parse("output.decision.winning_generator", "empty winning generator"))?;
    let generator = GeneratorSlot::from_label(&label).ok_or_else(|| {
        Error::parse(
            "output.decision.winning_generator",
            format!("`{}` does not name generator 1 or 2", label),
        )
    })?;

    let confidence_value = child(decision, "confidence", "output.decision.confidence")?;
    let confidence = parse_float(confidence_value)
        .ok_or_else(|| Error::parse("output.decision.confidence", "confidence is not a number"))?;
    if !(0.0..=100.0).contains(&confidence) {
        return Err(Error::parse(
            "output.decision.confidence",
            format!("confidence {} is outside 0-100", confidence),
        ));
    }

    let captions = caption_values(child(decision, "winning_captions", "output.decision.winning_captions")?)?;
    if captions.is_empty() {
        return Err(Error::parse("output.decision.winning_captions", "no winning captions"));
    }

    let explanation = decision
        .get("explanation")
        .and_then(scalar_text)
        .unwrap_or_default();

    Ok(FinalVerdict {
        generator_1,
        generator_2,
        winner: Winner {
            generator,
            confidence,
            captions,
            explanation,
        },
    })
}

/// Render one generator's feedback for its revision prompt
pub fn format_feedback(feedback: &EvaluationFeedback) -> String {
    let mut out = String::from(FEEDBACK_HEADER);
    out.push_str("output:\n  evaluation:\n    scores:\n");
    for (criterion, score) in &feedback.scores {
        out.push_str(&format!("      {}: {}/5\n", criterion.title(), score));
    }
    for (name, items) in [("strengths", &feedback.strengths), ("improvements", &feedback.improvements)] {
        if items.is_empty() {
            out.push_str(&format!("    {}: []\n", name));
        } else {
            out.push_str(&format!("    {}:\n", name));
            for item in items {
                out.push_str(&format!("      - \"{}\"\n", yaml_escape(item)));
            }
        }
    }
    out
}

fn parse_evaluation(output: &Value, slot: GeneratorSlot) -> Result<EvaluationFeedback> {
    let section = format!("output.{}", slot.key());
    let generator = child(output, slot.key(), &section)?;
    let scores_section = format!("{}.scores", section);
    let scores_value = child(generator, "scores", &scores_section)?;

    let mut scores = BTreeMap::new();
    for (criterion, value) in criterion_entries(scores_value, &scores_section)? {
        let score = parse_integer_score(value).ok_or_else(|| {
            Error::parse(
                format!("{}.{}", scores_section, criterion),
                format!("expected an integer score from 1 to 5, got {}", describe(value)),
            )
        })?;
        scores.insert(criterion, score);
    }

    Ok(EvaluationFeedback {
        scores,
        strengths: generator.get("strengths").map(string_list).unwrap_or_default(),
        improvements: generator.get("improvements").map(string_list).unwrap_or_default(),
    })
}

fn parse_final_scores(output: &Value, slot: GeneratorSlot) -> Result<GeneratorScores> {
    let section = format!("output.{}", slot.key());
    let generator = child(output, slot.key(), &section)?;
    let scores_section = format!("{}.scores", section);
    let scores_value = child(generator, "scores", &scores_section)?;

    let mut scores = BTreeMap::new();
    for (criterion, value) in criterion_entries(scores_value, &scores_section)? {
        let score = parse_float(value).ok_or_else(|| {
            Error::parse(
                format!("{}.{}", scores_section, criterion),
                format!("expected a numeric score, got {}", describe(value)),
            )
        })?;
        scores.insert(criterion, score);
    }

    let average_section = format!("{}.average", section);
    let average = parse_float(child(generator, "average", &average_section)?)
        .ok_or_else(|| Error::parse(average_section, "average is not a number"))?;

    Ok(GeneratorScores { scores, average })
}

/// All five criteria of a scores mapping, or a parse error naming the first missing one
fn criterion_entries<'a>(scores: &'a Value, section: &str) -> Result<Vec<(Criterion, &'a Value)>> {
    let mapping = scores
        .as_mapping()
        .ok_or_else(|| Error::parse(section, "scores must be a mapping"))?;

    let mut found: BTreeMap<Criterion, &Value> = BTreeMap::new();
    for (key, value) in mapping {
        if let Some(criterion) = key.as_str().and_then(Criterion::from_key) {
            found.insert(criterion, value);
        }
    }

    Criterion::ALL
        .into_iter()
        .map(|criterion| {
            found
                .get(&criterion)
                .map(|value| (criterion, *value))
                .ok_or_else(|| Error::parse(format!("{}.{}", section, criterion), "missing criterion"))
        })
        .collect()
}

fn child<'a>(value: &'a Value, key: &str, section: &str) -> Result<&'a Value> {
    match value.get(key) {
        Some(Value::Null) | None => Err(Error::parse(section, format!("missing `{}`", key))),
        Some(child) => Ok(child),
    }
}

/// Parse the `output` node, tolerating code fences and leading prose
fn load_output(raw: &str) -> Option<Value> {
    let body = strip_code_fences(raw);
    let from_document = serde_yaml::from_str::<Value>(body)
        .ok()
        .and_then(|doc| doc.get("output").cloned());
    if let Some(output) = from_document.filter(|o| !o.is_null()) {
        return Some(output);
    }

    // prose before the YAML block
    let start = body
        .match_indices("output:")
        .map(|(i, _)| i)
        .find(|&i| i == 0 || body[..i].ends_with('\n'))?;
    serde_yaml::from_str::<Value>(&body[start..])
        .ok()
        .and_then(|doc| doc.get("output").cloned())
        .filter(|o| !o.is_null())
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    body[..end].trim_end()
}

fn caption_values(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Sequence(items) => Ok(items.iter().filter_map(scalar_text).map(|s| strip_quotes(&s)).collect()),
        Value::Mapping(map) => Ok(numbered_entries(map)),
        Value::String(s) => Ok(vec![strip_quotes(s)]),
        other => Err(Error::parse("output.captions", format!("unexpected {}", describe(other)))),
    }
}

/// Values of a mapping ordered by numeric key; non-numeric keys keep document order at the end
fn numbered_entries(map: &Mapping) -> Vec<String> {
    let mut entries: Vec<(u64, usize, String)> = map
        .iter()
        .enumerate()
        .filter_map(|(position, (key, value))| {
            let text = scalar_text(value)?;
            let number = key
                .as_u64()
                .or_else(|| key.as_str().and_then(|k| k.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().ok()))
                .unwrap_or(u64::MAX);
            Some((number, position, strip_quotes(&text)))
        })
        .collect();
    entries.sort_by_key(|(number, position, _)| (*number, *position));
    entries.into_iter().map(|(_, _, text)| text).collect()
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_integer_score(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().trim_end_matches("/5").trim().parse::<u64>().ok()?,
        _ => return None,
    };
    (1..=5).contains(&score).then_some(score as u8)
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches("/5")
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "nothing".to_string(),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        other => scalar_text(other).map(|s| format!("`{}`", s)).unwrap_or_else(|| "a tagged value".to_string()),
    }
}

fn strip_quotes(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}'))
        .trim()
        .to_string()
}

fn yaml_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', " ")
}

fn caption_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(?:[-*]\s*)?\**caption\s*(\d+)\**\s*:\**\s*(.+?)\s*$").expect("valid caption regex")
    })
}
