//! Scripted LLM client for tests and offline demos

use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::openrouter::{CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One canned reply
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Completion text
    Text(String),
    /// Backend failure with the given message
    Failure(String),
}

/// A client that replays canned replies in order, cycling when exhausted.
///
/// Register one instance per backend: concurrent debate rounds then stay
/// deterministic, because each backend consumes its own script.
#[derive(Debug)]
pub struct ScriptedClient {
    name: String,
    replies: Vec<ScriptedReply>,
    index: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    /// Create a client that returns the given texts in order
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(|r| ScriptedReply::Text(r.into())).collect())
    }

    /// Create a client from explicit replies (texts and failures)
    pub fn from_replies(replies: Vec<ScriptedReply>) -> Self {
        Self {
            name: "scripted".to_string(),
            replies,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a client that always returns the same text
    pub fn constant(reply: impl Into<String>) -> Self {
        Self::new([reply.into()])
    }

    /// Set the name reported by `client_type`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of completed calls
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Copies of every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        self.requests.lock().push(request);

        if self.replies.is_empty() {
            return Err(Error::backend(&self.name, "no scripted replies"));
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed);
        match &self.replies[idx % self.replies.len()] {
            ScriptedReply::Text(text) => Ok(CompletionResponse::from_text(model, text.clone())),
            ScriptedReply::Failure(message) => Err(Error::backend(&self.name, message.clone())),
        }
    }

    fn client_type(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        "memory://scripted"
    }
}
