//! Model registry for managing available LLM providers

use super::{all_models, find_model, LlmService, LoggingService, ModelDef, Provider};
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    /// Gateway URL that proxies provider APIs and handles auth
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            default_model: std::env::var("DEFAULT_MODEL").ok(),
        }
    }
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    /// Create an empty registry for testing purposes
    #[cfg(test)]
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: "gpt-3.5-turbo".to_string(),
        }
    }

    /// Register a service under an ID, replacing any existing entry
    #[cfg(test)]
    pub fn with_service(mut self, model_id: &str, service: Arc<dyn LlmService>) -> Self {
        self.services.insert(model_id.to_string(), service);
        self
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        let default_model = config
            .default_model
            .clone()
            .filter(|id| find_model(id).is_some())
            .unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        Self {
            services,
            default_model,
        }
    }

    /// Try to create a model service, validating prerequisites
    fn try_create_model(model_def: &ModelDef, config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
        // In gateway mode the gateway handles authentication
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            match model_def.provider {
                Provider::OpenAI => config.openai_api_key.as_ref()?,
            }
            .clone()
        };

        match (model_def.factory)(&api_key, config.gateway.as_deref()) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(e) => {
                tracing::debug!(model = model_def.id, error = %e, "Model unavailable");
                None
            }
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model ID
    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// Whether a model ID is on the participant allow-list
    pub fn is_allowed(&self, model_id: &str) -> bool {
        find_model(model_id).is_some()
    }

    /// List model IDs that have a usable service
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Get detailed information about allow-listed models
    pub fn model_info(&self) -> Vec<crate::api::ModelInfo> {
        all_models()
            .iter()
            .map(|def| crate::api::ModelInfo {
                id: def.id.to_string(),
                provider: def.provider.display_name().to_string(),
                description: def.description.to_string(),
                available: self.services.contains_key(def.id),
                usd_per_1k_tokens: def.pricing.usd_per_1k,
                eur_per_1k_tokens: def.pricing.eur_per_1k,
            })
            .collect()
    }

    /// Check if any models are available
    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}
