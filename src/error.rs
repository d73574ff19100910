//! Error types for the MemeFact pipeline

use thiserror::Error;

/// Result type alias for MemeFact operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the MemeFact pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// The model declined to produce content
    #[error("Model refused to answer: {0}")]
    Refusal(String),

    /// Structured model output is missing fields or holds out-of-range values
    #[error("Parse error in `{section}`: {message}")]
    Parse { section: String, message: String },

    /// Error reported by an LLM backend (HTTP status, empty completion, ...)
    #[error("Backend error: {backend}: {message}")]
    Backend {
        backend: String,
        /// HTTP status, when the backend answered with one
        status: Option<u16>,
        message: String,
    },

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Client-side rate limit rejected the call
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Malformed pipeline request or configuration combination
    #[error("Validation error: {0}")]
    Validation(String),

    /// Meme rendering failed
    #[error("Render error: {template}: {message}")]
    Render { template: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML error (prompt templates, configuration)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generation step produced nothing usable
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// The pipeline used up its attempt budget
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl Error {
    /// Create a parse error for the given section
    pub fn parse(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            section: section.into(),
            message: message.into(),
        }
    }

    /// Create a backend error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create a backend error for a non-success HTTP status
    pub fn backend_status(backend: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a render error
    pub fn render(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an empty-result error
    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyResult(msg.into())
    }

    /// Whether the gateway may retry the call that produced this error.
    ///
    /// Only network-level failures qualify. Client errors (4xx other than
    /// 408 and 429) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Backend {
                status: Some(status),
                ..
            } => !(400..500).contains(status) || matches!(status, 408 | 429),
            Self::Backend { .. } | Self::Timeout(_) | Self::RateLimited(_) => true,
            _ => false,
        }
    }

    /// Whether a fresh generation attempt in the pipeline loop may succeed.
    pub fn is_recoverable(&self) -> bool {
        self.is_transient()
            || matches!(
                self,
                Self::Refusal(_) | Self::Parse { .. } | Self::EmptyResult(_) | Self::Render { .. }
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_section() {
        let err = Error::parse("decision", "missing key");
        assert_eq!(err.to_string(), "Parse error in `decision`: missing key");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::backend("openrouter", "503").is_transient());
        assert!(Error::Timeout("judge".into()).is_transient());
        assert!(!Error::Refusal("I can't".into()).is_transient());
        assert!(!Error::parse("output", "missing").is_transient());
    }

    #[test]
    fn test_client_status_is_permanent() {
        assert!(Error::backend_status("openrouter", 503, "overloaded").is_transient());
        assert!(Error::backend_status("openrouter", 429, "slow down").is_transient());
        assert!(Error::backend_status("vllm", 408, "request timeout").is_transient());

        let unauthorized = Error::backend_status("openrouter", 401, "bad key");
        assert!(!unauthorized.is_transient());
        assert!(!unauthorized.is_recoverable());
        assert!(!Error::backend_status("anthropic", 400, "bad request").is_recoverable());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Refusal("no".into()).is_recoverable());
        assert!(Error::parse("output", "missing").is_recoverable());
        assert!(Error::empty("cov baseline").is_recoverable());
        assert!(!Error::validation("bad combo").is_recoverable());
        assert!(!Error::config("no key").is_recoverable());
    }
}
