//! Centralized model definitions
//!
//! The allow-list of models a participant may be configured with, together
//! with the price table the cost model reads from.

use super::openai::OpenAIModel;
use super::{LlmService, OpenAIService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAI,
}

impl Provider {
    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

/// Published price of a model, per 1K tokens (prompt and completion blended)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub usd_per_1k: f64,
    /// Provider-published EUR price. When absent the cost model converts
    /// from USD with its fallback rate.
    pub eur_per_1k: Option<f64>,
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "gpt-4o")
    pub id: &'static str,
    /// Provider for this model
    pub provider: Provider,
    /// Human-readable description
    pub description: &'static str,
    pub pricing: Pricing,
    /// Factory function to create the service
    pub factory: fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>,
}

fn openai_factory(
    model: OpenAIModel,
    api_key: &str,
    gateway: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!(
            "{} requires {} or gateway",
            model.model_id(),
            Provider::OpenAI.api_key_env_var()
        ));
    }
    let service = OpenAIService::new(api_key.to_string(), model, gateway)?;
    Ok(Arc::new(service))
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            description: "GPT-4o (fast, multimodal flagship)",
            pricing: Pricing {
                usd_per_1k: 0.005,
                eur_per_1k: None,
            },
            factory: |api_key, gateway| openai_factory(OpenAIModel::GPT4o, api_key, gateway),
        },
        ModelDef {
            id: "gpt-4-turbo",
            provider: Provider::OpenAI,
            description: "GPT-4 Turbo (128K context)",
            pricing: Pricing {
                usd_per_1k: 0.01,
                eur_per_1k: None,
            },
            factory: |api_key, gateway| openai_factory(OpenAIModel::GPT4Turbo, api_key, gateway),
        },
        ModelDef {
            id: "gpt-4",
            provider: Provider::OpenAI,
            description: "GPT-4 (original, most expensive)",
            pricing: Pricing {
                usd_per_1k: 0.03,
                eur_per_1k: Some(0.028),
            },
            factory: |api_key, gateway| openai_factory(OpenAIModel::GPT4, api_key, gateway),
        },
        ModelDef {
            id: "gpt-3.5-turbo",
            provider: Provider::OpenAI,
            description: "GPT-3.5 Turbo (cheapest)",
            pricing: Pricing {
                usd_per_1k: 0.0015,
                eur_per_1k: None,
            },
            factory: |api_key, gateway| {
                openai_factory(OpenAIModel::GPT35Turbo, api_key, gateway)
            },
        },
    ]
}

/// Look up a model definition by its user-facing ID
pub fn find_model(id: &str) -> Option<&'static ModelDef> {
    all_models().iter().find(|m| m.id == id)
}
