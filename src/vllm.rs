//! vLLM local model client with OpenAI-compatible API support
//!
//! Open-weight vision models (Pixtral, Llama Vision, Qwen VL) can be served
//! locally via vLLM or SGLang instead of going through OpenRouter. The gateway
//! treats both the same way: register the client under the matching
//! [`BackendId`](crate::types::BackendId) with the model name the server exposes.
//!
//! ```bash
//! python -m vllm.entrypoints.openai.api_server \
//!     --model Qwen/Qwen2-VL-72B-Instruct \
//!     --host 0.0.0.0 \
//!     --port 8000
//! ```

use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::openrouter::{CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// vLLM client configuration
#[derive(Debug, Clone)]
pub struct VllmConfig {
    /// Base URL of the vLLM server (e.g., "http://localhost:8000")
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Optional API key (for secured vLLM deployments)
    pub api_key: Option<String>,
}

impl VllmConfig {
    /// Create a new vLLM configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(300),
            api_key: None,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("VLLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let api_key = std::env::var("VLLM_API_KEY").ok();

        let mut config = Self::new(base_url);
        config.api_key = api_key;
        Ok(config)
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// vLLM client for local model inference
pub struct VllmClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: VllmConfig,
}

impl VllmClient {
    /// Create a new vLLM client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = VllmConfig::from_env()?;
        Self::new(config)
    }

    /// Create a new vLLM client with the given configuration
    pub fn new(config: VllmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &VllmConfig {
        &self.config
    }

    /// Check if the vLLM server is healthy
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.config.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::backend_status(
                "vllm",
                status.as_u16(),
                format!("health check failed: {}", status),
            ));
        }
        Ok(())
    }

    /// Get model information from the vLLM server
    pub async fn get_models(&self) -> Result<ModelsResponse> {
        let url = format!("{}/v1/models", self.config.base_url);

        let mut request = self.client.get(&url);
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::backend_status(
                "vllm",
                status.as_u16(),
                format!("Failed to get models: {}", status),
            ));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LlmClient for VllmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let mut http_request = self.client.post(&url).json(&request);

        if let Some(ref api_key) = self.config.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = http_request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::backend_status(
                "vllm",
                status.as_u16(),
                format!("request failed with status {}: {}", status, error_text),
            ));
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion)
    }

    fn client_type(&self) -> &str {
        "vllm"
    }

    fn endpoint(&self) -> &str {
        &self.config.base_url
    }
}

/// Models response from vLLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Object type (always "list")
    pub object: String,
    /// List of available models
    pub data: Vec<ModelInfo>,
}

/// Information about a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model ID
    pub id: String,
    /// Object type (always "model")
    pub object: String,
    /// Creation timestamp
    pub created: u64,
    /// Owner organization
    pub owned_by: String,
}
