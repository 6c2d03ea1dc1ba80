//! API request and response types

use crate::session::{ErrorKind, ParticipantConfig, SessionSummary};
use serde::{Deserialize, Serialize};

/// Request to create and start a conversation
#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub participant1: ParticipantConfig,
    pub participant2: ParticipantConfig,
    /// Defaults to the standard opener when absent
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// Request to replace one or both system prompts
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePromptsRequest {
    #[serde(default)]
    pub prompt1: Option<String>,
    #[serde(default)]
    pub prompt2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// Acknowledgement for a command
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl SuccessResponse {
    pub fn ack() -> Self {
        Self {
            status: "success",
            conversation_id: None,
        }
    }

    pub fn started(conversation_id: impl Into<String>) -> Self {
        Self {
            status: "success",
            conversation_id: Some(conversation_id.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<SessionSummary>,
}

/// Allow-listed model with pricing
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    /// Whether credentials for the model are configured
    pub available: bool,
    pub usd_per_1k_tokens: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eur_per_1k_tokens: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            kind,
            message: message.into(),
        }
    }
}
