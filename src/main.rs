//! Duet - two language models in conversation
//!
//! A Rust backend running model-to-model conversation sessions, each driven
//! by its own lifecycle state machine and streamed to clients over SSE.

mod api;
mod config;
mod cost;
mod db;
mod export;
mod fanout;
mod ledger;
mod llm;
mod runtime;
mod session;
mod state_machine;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use llm::{LlmConfig, ModelRegistry};
use runtime::{DatabaseStore, RegistryTurnGenerator, SessionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!("No LLM API keys configured. Set OPENAI_API_KEY or LLM_GATEWAY.");
    }

    let generator = RegistryTurnGenerator::new(
        Arc::clone(&llm_registry),
        config.max_tokens,
        config.temperature,
    );
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(DatabaseStore::new(db)),
        Arc::new(generator),
        config.runtime_settings(),
    ));

    // Nothing generates across restarts
    registry.recover().await?;

    let state = AppState::new(registry, llm_registry);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Duet server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
