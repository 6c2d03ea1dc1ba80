//! HTTP API
//!
//! JSON commands and queries over conversations, plus an SSE event stream
//! per conversation.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::ModelRegistry;
use crate::runtime::SessionRegistry;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, llm_registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            llm_registry,
        }
    }
}
