//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ConversationListResponse, ErrorResponse, ExportQuery, ModelsResponse, StartConversationRequest,
    SuccessResponse, UpdatePromptsRequest,
};
use super::AppState;
use crate::export::{self, ExportFormat};
use crate::session::{
    CreateSession, ErrorKind, SessionError, SessionView, DEFAULT_INITIAL_MESSAGE,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/:id/pause", post(pause_conversation))
        .route("/api/conversations/:id/resume", post(resume_conversation))
        .route("/api/conversations/:id/prompts", post(update_prompts))
        .route("/api/conversations/:id/export", get(export_conversation))
        .route("/api/conversations/:id/stream", get(stream_conversation))
        .route("/api/models", get(list_models))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Commands
// ============================================================

async fn start_conversation(
    State(state): State<AppState>,
    Json(req): Json<StartConversationRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let initial_message = req
        .initial_message
        .unwrap_or_else(|| DEFAULT_INITIAL_MESSAGE.to_string());
    let request = CreateSession {
        conversation_id: req.conversation_id,
        title: req.title,
        participant1: req.participant1,
        participant2: req.participant2,
    };

    let session = state
        .registry
        .start_conversation(request, &initial_message)
        .await?;
    Ok(Json(SuccessResponse::started(session.id())))
}

async fn pause_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.registry.get(&id).await?.pause()?;
    Ok(Json(SuccessResponse::ack()))
}

async fn resume_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.registry.get(&id).await?.resume()?;
    Ok(Json(SuccessResponse::ack()))
}

async fn update_prompts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePromptsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .registry
        .get(&id)
        .await?
        .update_system_prompts(req.prompt1, req.prompt2)?;
    Ok(Json(SuccessResponse::ack()))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.registry.delete(&id).await?;
    Ok(Json(SuccessResponse::ack()))
}

// ============================================================
// Queries
// ============================================================

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationListResponse> {
    let conversations = state.registry.list().await;
    Json(ConversationListResponse { conversations })
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.registry.get(&id).await?.snapshot()))
}

async fn export_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let requested = query.format.as_deref().unwrap_or("csv");
    let format = ExportFormat::parse(requested).ok_or_else(|| {
        SessionError::InvalidRequest(format!("unsupported export format {requested:?}"))
    })?;

    let view = state.registry.get(&id).await?.snapshot();
    let body = export::render(format, &view.record.transcript);
    let filename = export::filename(&id, format, Utc::now());
    tracing::info!(session_id = %id, format = format.extension(), "Exporting transcript");

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

async fn stream_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (subscription, snapshot) = state.registry.subscribe(&id).await?;
    Ok(sse_stream(state.registry.clone(), subscription, snapshot))
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.model_info(),
        default: state.llm_registry.default_model_id().to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("duet ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

struct AppError(SessionError);

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AdapterFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse::new(kind, self.0.to_string()));
        (status, body).into_response()
    }
}
