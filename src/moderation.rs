//! Moderation gate for rendered memes

use crate::candidate::Candidate;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Classifies a rendered meme
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    /// Unique identifier
    fn id(&self) -> &str;

    /// Whether the image at `url` is unsafe to publish
    async fn is_unsafe(&self, url: &str) -> Result<bool>;
}

/// Sets safety flags on rendered candidates
#[derive(Clone, Default)]
pub struct ModerationGate {
    classifier: Option<Arc<dyn SafetyClassifier>>,
}

impl ModerationGate {
    /// A gate that classifies every rendered candidate
    pub fn new(classifier: Arc<dyn SafetyClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// A gate that passes candidates through untouched
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether a classifier is configured
    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    /// Classify the batch
    ///
    /// Unrendered candidates keep an unset flag; captions are never changed.
    pub async fn check(&self, mut candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let Some(classifier) = &self.classifier else {
            return Ok(candidates);
        };

        for candidate in candidates.iter_mut() {
            let Some(url) = candidate.url.as_deref() else {
                debug!(candidate = %candidate.id, "not rendered, skipping moderation");
                continue;
            };
            let is_unsafe = classifier.is_unsafe(url).await?;
            if is_unsafe {
                warn!(candidate = %candidate.id, classifier = classifier.id(), "candidate flagged unsafe");
            }
            candidate.mark(is_unsafe);
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TemplateRecord;

    struct UrlBlocklist(Vec<&'static str>);

    #[async_trait]
    impl SafetyClassifier for UrlBlocklist {
        fn id(&self) -> &str {
            "url_blocklist"
        }

        async fn is_unsafe(&self, url: &str) -> Result<bool> {
            Ok(self.0.iter().any(|blocked| url.contains(blocked)))
        }
    }

    fn batch() -> Vec<Candidate> {
        let template = TemplateRecord::new("1", "Two Buttons", 2);
        vec![
            Candidate::new(template.clone(), vec!["a".into(), "b".into()]).with_url("https://i.imgflip.com/ok.jpg"),
            Candidate::new(template.clone(), vec!["c".into(), "d".into()]).with_url("https://i.imgflip.com/bad.jpg"),
            Candidate::new(template, vec!["e".into(), "f".into()]),
        ]
    }

    #[tokio::test]
    async fn test_disabled_gate_is_identity() {
        let input = batch();
        let output = ModerationGate::disabled().check(input.clone()).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_flags_rendered_candidates_only() {
        let gate = ModerationGate::new(Arc::new(UrlBlocklist(vec!["bad"])));
        let output = gate.check(batch()).await.unwrap();

        assert_eq!(output[0].safety(), Some(false));
        assert_eq!(output[1].safety(), Some(true));
        assert_eq!(output[2].safety(), None);
        assert_eq!(output[1].captions, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_existing_flag_survives_clean_classification() {
        let mut candidates = batch();
        candidates[0].mark(true);
        let gate = ModerationGate::new(Arc::new(UrlBlocklist(vec![])));
        let output = gate.check(candidates).await.unwrap();
        assert!(output[0].is_flagged());
    }
}
