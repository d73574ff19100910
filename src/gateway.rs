//! Model gateway: one entry point to invoke any registered LLM backend
//!
//! Backends are registered once at startup in a [`BackendRegistry`] keyed by
//! [`BackendId`]. [`ModelGateway::invoke`] maps the sampling mode to a
//! temperature, attaches images when the backend accepts them, enforces the
//! per-call timeout and retries transient failures with bounded exponential
//! backoff. Refusals and malformed output are never retried here.

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::openrouter::{CompletionRequest, Message};
use crate::prompt::Prompt;
use crate::types::{BackendId, Sampling};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A registered backend
#[derive(Clone)]
pub struct BackendEntry {
    client: Arc<dyn LlmClient>,
    model: String,
    supports_images: bool,
}

impl BackendEntry {
    /// Model name sent to the provider
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether images are forwarded to this backend
    pub fn supports_images(&self) -> bool {
        self.supports_images
    }
}

/// Backends available to the gateway
#[derive(Clone, Default)]
pub struct BackendRegistry {
    entries: HashMap<BackendId, BackendEntry>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every known backend behind one OpenRouter-style client
    pub fn all_via(client: Arc<dyn LlmClient>) -> Self {
        BackendId::ALL
            .iter()
            .fold(Self::new(), |registry, backend| registry.register(*backend, client.clone()))
    }

    /// Register a backend with its default OpenRouter model slug
    pub fn register(self, backend: BackendId, client: Arc<dyn LlmClient>) -> Self {
        self.register_with_model(backend, client, backend.openrouter_model())
    }

    /// Register a backend under a provider-specific model name
    pub fn register_with_model(
        mut self,
        backend: BackendId,
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            backend,
            BackendEntry {
                client,
                model: model.into(),
                supports_images: backend.supports_images(),
            },
        );
        self
    }

    /// Look up a backend
    pub fn get(&self, backend: BackendId) -> Result<&BackendEntry> {
        self.entries
            .get(&backend)
            .ok_or_else(|| Error::validation(format!("backend `{}` is not registered", backend)))
    }

    /// Whether a backend is registered
    pub fn contains(&self, backend: BackendId) -> bool {
        self.entries.contains_key(&backend)
    }

    /// Whether the backend is registered and accepts images
    pub fn supports_images(&self, backend: BackendId) -> bool {
        self.entries
            .get(&backend)
            .map(|e| e.supports_images)
            .unwrap_or(false)
    }
}

/// Uniform invocation of LLM backends
pub struct ModelGateway {
    registry: BackendRegistry,
    config: GatewayConfig,
    timeout: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl ModelGateway {
    /// Create a gateway over the given registry
    pub fn new(registry: BackendRegistry, config: GatewayConfig) -> Self {
        let limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));
        let timeout = config.timeout();
        Self {
            registry,
            config,
            timeout,
            limiter,
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The backend registry
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Invoke a backend and return the raw completion text
    #[instrument(skip_all, fields(backend = %backend, mode = ?sampling.mode))]
    pub async fn invoke(&self, backend: BackendId, prompt: &Prompt, sampling: Sampling) -> Result<String> {
        let entry = self.registry.get(backend)?;
        let request = self.build_request(entry, prompt, sampling);

        let mut retry = 0;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            match self.call_once(backend, entry, request.clone()).await {
                Ok(text) => {
                    debug!(chars = text.len(), "completion received");
                    return Ok(text);
                }
                Err(e) if e.is_transient() && retry < self.config.retry.max_retries => {
                    let delay = self.config.retry.delay_for(retry);
                    warn!(error = %e, retry = retry + 1, delay_ms = delay.as_millis() as u64, "transient backend failure, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn build_request(&self, entry: &BackendEntry, prompt: &Prompt, sampling: Sampling) -> CompletionRequest {
        let images: &[String] = if entry.supports_images { &prompt.images } else { &[] };
        let mut request = CompletionRequest::new(
            entry.model.clone(),
            vec![Message::user_with_images(prompt.text.clone(), images)],
        )
        .with_temperature(self.config.sampling.temperature(sampling.mode));

        if let Some(max_tokens) = sampling.max_tokens.or(self.config.sampling.default_max_tokens) {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(seed) = sampling.seed {
            request = request.with_seed(seed);
        }
        request
    }

    async fn call_once(&self, backend: BackendId, entry: &BackendEntry, request: CompletionRequest) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, entry.client.complete(request))
            .await
            .map_err(|_| Error::Timeout(format!("{} did not answer within {:?}", backend, self.timeout)))??;

        response
            .first_text()
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::backend(backend.as_str(), "empty completion"))
    }
}
