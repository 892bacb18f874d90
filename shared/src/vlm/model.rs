//! Chat-completions transport for the vision-language model.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{Error, Result};

/// Request body for an OpenAI-compatible chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Failure of a single model call.
#[derive(Error, Debug)]
pub enum ModelCallError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by model endpoint")]
    RateLimited,
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
}

impl ModelCallError {
    /// Transient failures are worth another attempt; client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelCallError::Network(_)
            | ModelCallError::Timeout
            | ModelCallError::RateLimited
            | ModelCallError::EmptyResponse => true,
            ModelCallError::Status { status, .. } => *status >= 500,
            ModelCallError::Decode(_) => false,
        }
    }
}

/// Anything that can answer a chat request with text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, ModelCallError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatibleModel {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiCompatibleModel {
    /// `timeout` bounds each individual call.
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl VisionModel for OpenAiCompatibleModel {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, ModelCallError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ModelCallError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ModelCallError::Decode(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ModelCallError::EmptyResponse);
        }

        debug!("Model answered with {} characters", content.len());
        Ok(content)
    }
}

fn classify(err: reqwest::Error) -> ModelCallError {
    if err.is_timeout() {
        ModelCallError::Timeout
    } else {
        ModelCallError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ModelCallError::Timeout.is_retryable());
        assert!(ModelCallError::RateLimited.is_retryable());
        assert!(ModelCallError::EmptyResponse.is_retryable());
        assert!(ModelCallError::Network("reset".into()).is_retryable());
        assert!(ModelCallError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!ModelCallError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!ModelCallError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "vl-model".to_string(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: MessageContent::Text("be precise".to_string()),
                },
                ChatMessage {
                    role: Role::User,
                    content: MessageContent::Parts(vec![
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: "https://img/x.jpg".to_string(),
                            },
                        },
                        ContentPart::Text {
                            text: "analyse".to_string(),
                        },
                    ]),
                },
            ],
            temperature: 0.7,
            max_tokens: 2000,
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be precise");
        assert_eq!(json["messages"][1]["content"][0]["type"], "image_url");
        assert_eq!(json["messages"][1]["content"][0]["image_url"]["url"], "https://img/x.jpg");
        assert_eq!(json["messages"][1]["content"][1]["type"], "text");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_completion_decoding() {
        let raw = r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":" hi "}}]}"#;
        let completion: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert_eq!(completion.choices[0].message.content.as_deref(), Some(" hi "));

        let empty: ChatCompletion = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.choices.is_empty());
    }
}
