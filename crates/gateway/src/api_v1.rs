//! HTTP API v1 over the agent loop.
//!
//! Endpoints:
//!
//! - `GET  /v1/tools`: List available tools
//! - `GET  /v1/sessions`: List session ids
//! - `POST /v1/sessions`: Create a session
//! - `GET  /v1/sessions/{id}`: Full session history
//! - `POST /v1/sessions/{id}/turns`: Send a message, run a turn
//! - `POST /v1/sessions/{id}/approval`: Approve or reject pending tool calls
//! - `GET  /v1/sessions/{id}/checkpoint`: Export a snapshot
//! - `PUT  /v1/sessions/{id}/checkpoint`: Restore a snapshot

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use toolwright_agent::{AgentLoop, Approval, TurnOutcome};
use toolwright_core::error::{StoreError, TurnError};
use toolwright_core::session::{Session, SessionId, Snapshot};

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub agent: Arc<AgentLoop>,
}

pub type SharedApiState = Arc<ApiV1State>;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/sessions", get(list_sessions_handler).post(create_session_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}/turns", post(turn_handler))
        .route("/sessions/{id}/approval", post(approval_handler))
        .route(
            "/sessions/{id}/checkpoint",
            get(export_checkpoint_handler).put(import_checkpoint_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        StoreError::InvalidHistory { .. } => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        _ => {
            error!(error = %e, "Session store failure");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn turn_error(e: TurnError) -> ApiError {
    match e {
        TurnError::Store(e) => store_error(e),
        TurnError::ApprovalPending(_) | TurnError::NoPendingApproval(_) => {
            api_error(StatusCode::CONFLICT, e.to_string())
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<String>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: String,
}

#[derive(Deserialize)]
struct TurnRequest {
    message: String,
}

#[derive(Deserialize)]
struct ApprovalRequest {
    approve: bool,
    #[serde(default)]
    reason: Option<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let defs = state.agent.tools().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}

async fn list_sessions_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let ids = state.agent.store().list().await.map_err(store_error)?;
    let sessions: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    let count = sessions.len();
    Ok(Json(SessionListResponse { sessions, count }))
}

async fn create_session_handler(
    State(state): State<SharedApiState>,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    let id = SessionId::new();
    state.agent.store().get(&id).await.map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(CreatedSession { id: id.to_string() })))
}

async fn get_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = SessionId::from(id);
    state
        .agent
        .store()
        .find(&id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Session not found: {id}")))
}

async fn turn_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let id = SessionId::from(id);
    info!(session = %id, message_len = payload.message.len(), "v1 turn request");
    state
        .agent
        .run_turn(&id, payload.message)
        .await
        .map(Json)
        .map_err(turn_error)
}

async fn approval_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let id = SessionId::from(id);
    let approval = if payload.approve {
        Approval::Approve
    } else {
        Approval::Reject {
            reason: payload.reason.unwrap_or_else(|| "no reason given".into()),
        }
    };
    state
        .agent
        .resolve_approval(&id, approval)
        .await
        .map(Json)
        .map_err(turn_error)
}

async fn export_checkpoint_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    let id = SessionId::from(id);
    state
        .agent
        .store()
        .checkpoint(&id)
        .await
        .map(Json)
        .map_err(store_error)
}

async fn import_checkpoint_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(snapshot): Json<Snapshot>,
) -> Result<Json<Session>, ApiError> {
    let id = SessionId::from(id);
    let store = state.agent.store();
    let _guard = store.lock(&id).await;
    info!(session = %id, from = %snapshot.source(), "Restoring checkpoint");
    store.restore(&id, snapshot).await.map(Json).map_err(store_error)
}
