//! Image description client.
//!
//! Sends one image per request to an OpenAI-compatible chat completions
//! endpoint and returns the first completion's text.

use a3s_enrich_core::config::DescriberConfig;
use a3s_enrich_core::error::{EnrichError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

/// Turns image bytes into natural-language text.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, image: &[u8]) -> Result<String>;
}

/// OpenAI chat completions client
pub struct OpenAiDescriber {
    config: DescriberConfig,
    client: reqwest::Client,
}

impl OpenAiDescriber {
    /// Create a client whose every call is bounded by the configured timeout.
    pub fn new(config: DescriberConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EnrichError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn request_body(&self, image: &[u8]) -> serde_json::Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);

        serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": self.config.prompt,
                    },
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/jpeg;base64,{}", encoded),
                        },
                    },
                ],
            }],
            "max_tokens": self.config.max_tokens,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> EnrichError {
        if err.is_timeout() {
            EnrichError::Timeout(format!(
                "description service did not answer within {}s",
                self.config.timeout_secs
            ))
        } else {
            EnrichError::ServiceUnavailable(format!("{}: {}", self.config.endpoint, err))
        }
    }
}

#[async_trait]
impl Describer for OpenAiDescriber {
    async fn describe(&self, image: &[u8]) -> Result<String> {
        tracing::debug!(endpoint = %self.config.endpoint, size = image.len(), "Requesting image description");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(classify_status(status, body));
        }

        parse_completion(status.as_u16(), &body)
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> EnrichError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            EnrichError::Unauthorized(format!("{}: {}", status, body))
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => {
            EnrichError::RateLimited(format!("{}: {}", status, body))
        }
        _ => EnrichError::MalformedResponse {
            status: Some(status.as_u16()),
            message: format!("failed to process image: {}", body),
        },
    }
}

fn parse_completion(status: u16, body: &str) -> Result<String> {
    let malformed = |message: String| EnrichError::MalformedResponse {
        status: Some(status),
        message,
    };

    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| malformed(format!("Failed to parse response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("response contained no choices".to_string()))?;

    choice
        .message
        .content
        .ok_or_else(|| malformed("first choice has no content".to_string()))
}

// Chat completions response types
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}
