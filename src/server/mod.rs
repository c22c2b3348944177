//! HTTP surface — the chat endpoint consumed by the mobile client.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::workflow::{Orchestrator, Stage, UserContext, WorkflowStatus};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the Axum router with the chat and health routes.
pub fn chat_routes(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Wire types ──────────────────────────────────────────────────────────

/// Inbound chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<UserContext>,
}

/// Successful chat response. Degraded requests still use this shape —
/// the caller distinguishes them by `metadata.workflow_status`.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
    pub role: &'static str,
    pub timestamp: DateTime<Utc>,
    pub metadata: ChatMetadata,
}

#[derive(Debug, Serialize)]
pub struct ChatMetadata {
    pub workflow_status: WorkflowStatus,
    pub stages_run: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Error body for transport-level faults only; workflow failures
/// degrade into a normal `ChatResponse` instead.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    "ok"
}

/// POST /api/chat
///
/// Runs the full workflow for one message. Always 200 with a well-formed
/// body once the request parses — the degrade-not-fail policy lives in
/// the workflow, not here.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    if request.message.chars().count() > 4000 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(ErrorResponse {
                error: "message_too_long".into(),
                detail: "message exceeds 4000 characters".into(),
            })
            .unwrap_or_default()),
        );
    }

    let context = request.context.unwrap_or_default();
    info!(
        chars = request.message.chars().count(),
        has_context = !context.is_empty(),
        "Chat request"
    );

    let outcome = state.orchestrator.run(request.message, context).await;

    let response = ChatResponse {
        id: Uuid::new_v4().to_string(),
        content: outcome.answer,
        role: "assistant",
        timestamp: Utc::now(),
        metadata: ChatMetadata {
            workflow_status: outcome.status,
            stages_run: outcome.stages_run,
            error: outcome.error,
        },
    };

    (
        StatusCode::OK,
        Json(serde_json::to_value(response).unwrap_or_default()),
    )
}
