//! Anthropic messages API adapter
//!
//! Accepts the shared chat request shape and rewrites only what differs on the
//! wire: system prompts move to a top-level field, `max_tokens` is mandatory,
//! and images become `image` blocks with a URL source.

use crate::config::AnthropicConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::openrouter::{
    Choice, CompletionRequest, CompletionResponse, ContentPart, MessageContent, ResponseMessage,
    Role, Usage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Create a client from `ANTHROPIC_API_KEY`
    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    /// Create a client with the given configuration
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn to_messages_request(&self, request: CompletionRequest) -> MessagesRequest {
        let mut system = Vec::new();
        let mut messages = Vec::new();

        for message in request.messages {
            match message.role {
                Role::System => system.push(message.content.text()),
                Role::User | Role::Assistant => {
                    let role = if matches!(message.role, Role::User) { "user" } else { "assistant" };
                    messages.push(AnthropicMessage {
                        role: role.to_string(),
                        content: to_blocks(message.content),
                    });
                }
            }
        }

        MessagesRequest {
            model: request.model,
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
            system: if system.is_empty() { None } else { Some(system.join("\n\n")) },
            messages,
            temperature: request.temperature,
        }
    }
}

fn to_blocks(content: MessageContent) -> Vec<ContentBlock> {
    match content {
        MessageContent::Text(text) => vec![ContentBlock::Text { text }],
        MessageContent::Parts(parts) => parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text { text } => ContentBlock::Text { text },
                ContentPart::ImageUrl { image_url } => ContentBlock::Image {
                    source: ImageSource::Url { url: image_url.url },
                },
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImageSource {
    Url { url: String },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl From<MessagesResponse> for CompletionResponse {
    fn from(response: MessagesResponse) -> Self {
        let text = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        CompletionResponse {
            id: response.id,
            model: response.model,
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: Some(text),
                },
                finish_reason: response.stop_reason,
            }],
            usage: response.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/messages", self.config.base_url.as_str().trim_end_matches('/'));
        let body = self.to_messages_request(request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::backend_status(
                "anthropic",
                status.as_u16(),
                format!("Request failed with status {}: {}", status, error_text),
            ));
        }

        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed.into())
    }

    fn client_type(&self) -> &str {
        "anthropic"
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrouter::Message;
    use url::Url;

    #[tokio::test]
    async fn test_request_translation_and_response_mapping() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "anthropic-key")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "claude-3-5-sonnet-20240620",
                "max_tokens": 1000,
                "system": "be brief",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "caption it"},
                        {"type": "image", "source": {"type": "url", "url": "https://i.imgflip.com/1g8my4.jpg"}}
                    ]
                }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"msg_1","model":"claude-3-5-sonnet-20240620","content":[{"type":"text","text":"Caption 1: ok"}],"stop_reason":"end_turn","usage":{"input_tokens":7,"output_tokens":3}}"#,
            )
            .create_async()
            .await;

        let config = AnthropicConfig::new("anthropic-key")
            .unwrap()
            .with_base_url(Url::parse(&server.url()).unwrap());
        let client = AnthropicClient::new(config).unwrap();
        let request = CompletionRequest::new(
            "claude-3-5-sonnet-20240620",
            vec![
                Message::system("be brief"),
                Message::user_with_images("caption it", &["https://i.imgflip.com/1g8my4.jpg".to_string()]),
            ],
        );

        let response = client.complete(request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.first_text().as_deref(), Some("Caption 1: ok"));
        assert_eq!(response.usage.unwrap().total_tokens, 10);
    }
}
