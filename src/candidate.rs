//! Meme candidates

use crate::types::{CandidateId, TemplateRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One meme: a template, its captions and, once rendered, an image URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate identifier
    pub id: CandidateId,
    /// Template the captions were written for
    pub template: TemplateRecord,
    /// One caption per slot
    pub captions: Vec<String>,
    /// Rendered image URL
    pub url: Option<String>,
    /// Safety classification; `None` until moderated
    unsafe_flag: Option<bool>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    /// Create an unrendered, unmoderated candidate
    pub fn new(template: TemplateRecord, captions: Vec<String>) -> Self {
        Self {
            id: CandidateId::new(),
            template,
            captions,
            url: None,
            unsafe_flag: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the rendered image URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Whether the candidate has been rendered
    pub fn is_rendered(&self) -> bool {
        self.url.is_some()
    }

    /// Safety classification, if any
    pub fn safety(&self) -> Option<bool> {
        self.unsafe_flag
    }

    /// Whether the candidate was classified unsafe
    pub fn is_flagged(&self) -> bool {
        self.unsafe_flag == Some(true)
    }

    /// Whether the caption count matches the template's slots
    pub fn fits_template(&self) -> bool {
        self.captions.len() == self.template.box_count
    }

    /// Record a classification. An unsafe flag is never cleared.
    pub(crate) fn mark(&mut self, is_unsafe: bool) {
        self.unsafe_flag = Some(self.is_flagged() || is_unsafe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsafe_flag_is_sticky() {
        let mut candidate = Candidate::new(TemplateRecord::new("1", "Two Buttons", 2), vec!["a".into(), "b".into()]);
        assert_eq!(candidate.safety(), None);
        assert!(candidate.fits_template());

        candidate.mark(false);
        assert_eq!(candidate.safety(), Some(false));
        candidate.mark(true);
        candidate.mark(false);
        assert!(candidate.is_flagged());
    }

    #[test]
    fn test_serializes_with_timestamp() {
        let candidate = Candidate::new(TemplateRecord::new("1", "Two Buttons", 2), vec!["a".into()])
            .with_url("https://i.imgflip.com/abc.jpg");
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["url"], "https://i.imgflip.com/abc.jpg");
        assert!(json["created_at"].is_string());
        assert!(!candidate.fits_template());
    }
}
