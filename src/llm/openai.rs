//! `OpenAI` chat-completions provider implementation

use super::types::{LlmRequest, LlmResponse, Usage};
use super::{LlmError, LlmErrorKind, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `OpenAI` chat models on the participant allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIModel {
    GPT4o,
    GPT4Turbo,
    GPT4,
    GPT35Turbo,
}

impl OpenAIModel {
    pub fn api_name(self) -> &'static str {
        match self {
            OpenAIModel::GPT4o => "gpt-4o",
            OpenAIModel::GPT4Turbo => "gpt-4-turbo",
            OpenAIModel::GPT4 => "gpt-4",
            OpenAIModel::GPT35Turbo => "gpt-3.5-turbo",
        }
    }

    pub fn model_id(self) -> &'static str {
        // User-facing IDs match the API names for this provider
        self.api_name()
    }
}

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: OpenAIModel,
    base_url: String,
}

impl OpenAIService {
    pub fn new(api_key: String, model: OpenAIModel, gateway: Option<&str>) -> Result<Self, String> {
        let base_url = match gateway {
            Some(gw) => format!("{}/openai/v1/chat/completions", gw.trim_end_matches('/')),
            None => "https://api.openai.com/v1/chat/completions".to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if !request.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(request.system.clone()),
            });
        }

        messages.extend(request.messages.iter().map(|msg| OpenAIMessage {
            role: msg.role.as_str().to_string(),
            content: Some(msg.text.clone()),
        }));

        OpenAIRequest {
            model: self.model.api_name().to_string(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No choices in response"))?;

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::unknown("Empty completion"));
        }

        Ok(LlmResponse {
            text,
            usage: Usage::new(
                u64::from(resp.usage.prompt_tokens),
                u64::from(resp.usage.completion_tokens),
            ),
        })
    }

    fn classify_failure(status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = serde_json::from_str::<OpenAIErrorResponse>(body)
            .map_or_else(|_| body.to_string(), |r| r.error.message);

        match LlmErrorKind::from_status(status.as_u16()) {
            LlmErrorKind::Auth => LlmError::auth(format!("Authentication failed: {message}")),
            LlmErrorKind::RateLimit => {
                LlmError::rate_limit(format!("Rate limit exceeded: {message}"))
            }
            LlmErrorKind::InvalidRequest => {
                LlmError::invalid_request(format!("Invalid request: {message}"))
            }
            LlmErrorKind::ServerError => {
                LlmError::server_error(format!("Server error: {message}"))
            }
            _ => LlmError::unknown(format!("HTTP {status}: {message}")),
        }
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_failure(status, &body));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        self.model.model_id()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
