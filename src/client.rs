// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Chat-completions client for hosted vision inference

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::request::AnalysisRequest;
use crate::{Result, ShadowError};

/// Sends one analysis request and returns the model's answer.
///
/// The API key is a call parameter; implementations must not keep it.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest, api_key: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl OpenAiClient {
    /// Create a new client for the given API base URL
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().build()?;

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl VisionClient for OpenAiClient {
    async fn analyze(&self, request: AnalysisRequest, api_key: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatCompletionRequest {
            model: request.model(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: request.prompt(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: request.image().data_uri(),
                        },
                    },
                ],
            }],
            max_tokens: request.max_output_tokens(),
        };

        debug!(
            "Sending vision request: model={}, image={} ({} base64 chars)",
            request.model(),
            request.image().mime_type,
            request.image().encoded_data.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = classify_failure(status, &text);
            warn!("Provider returned status {}", status);
            return Err(err);
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            ShadowError::Unclassified(format!("Unexpected response from provider: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ShadowError::Unclassified("Provider returned no answer".to_string()))
    }
}

/// Map a non-success response onto the error taxonomy.
///
/// Status code first, then the provider's error code, then its message text.
fn classify_failure(status: StatusCode, body: &str) -> ShadowError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::TOO_MANY_REQUESTS => {
            return ShadowError::from_status(status, "");
        }
        _ => {}
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.code.as_deref() {
            Some("invalid_api_key") => ShadowError::Authentication,
            Some("rate_limit_exceeded") | Some("insufficient_quota") => ShadowError::RateLimit,
            _ => ShadowError::from_status(status, &envelope.error.message),
        },
        Err(_) => ShadowError::from_status(status, body.trim()),
    }
}
