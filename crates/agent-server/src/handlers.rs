//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use agent_core::{
    AgentError, Message, ProviderDescriptor, ProviderOptions, Thread, ThreadId, ThreadSummary,
    TurnReply,
};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub threads: usize,
    pub tools: Vec<String>,
}

/// Body of thread creation and rebinding
#[derive(Debug, Deserialize)]
pub struct BindRequest {
    #[serde(rename = "providerId", alias = "provider")]
    pub provider_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl BindRequest {
    fn options(&self) -> ProviderOptions {
        ProviderOptions {
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResponse {
    pub thread_id: ThreadId,
    pub provider: String,
    pub model: String,
}

impl From<&Thread> for ThreadResponse {
    fn from(thread: &Thread) -> Self {
        Self {
            thread_id: thread.id().clone(),
            provider: thread.binding().provider_id().to_string(),
            model: thread.binding().model().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub message: Message,
    pub provider: String,
    pub model: String,
}

impl From<TurnReply> for ReplyResponse {
    fn from(reply: TurnReply) -> Self {
        Self {
            message: reply.message,
            provider: reply.thread.provider,
            model: reply.thread.model,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: &AgentError) -> ApiError {
    let (status, code) = match err {
        AgentError::UnsupportedProvider(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_PROVIDER"),
        AgentError::ThreadNotFound(_) => (StatusCode::NOT_FOUND, "THREAD_NOT_FOUND"),
        AgentError::ThreadAlreadyStarted(_) => (StatusCode::CONFLICT, "ALREADY_STARTED"),
        AgentError::ProviderRequest { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "PROVIDER_ERROR"),
        AgentError::ToolChainLimitExceeded(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "TOOL_CHAIN_LIMIT")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    if status.is_server_error() {
        tracing::error!(code, "Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.into(),
        }),
    )
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "INVALID_REQUEST".into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        threads: state.threads.len().await,
        tools: state.tools().names(),
    })
}

/// Providers a thread can be bound to
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderDescriptor>> {
    Json(state.threads.providers())
}

pub async fn create_thread(
    State(state): State<AppState>,
    Json(payload): Json<BindRequest>,
) -> Result<(StatusCode, Json<ThreadResponse>), ApiError> {
    let thread = state
        .threads
        .create_thread(&payload.provider_id, &payload.options())
        .await
        .map_err(|e| api_error(&e))?;

    Ok((StatusCode::CREATED, Json(ThreadResponse::from(&thread))))
}

pub async fn list_threads(State(state): State<AppState>) -> Json<Vec<ThreadSummary>> {
    Json(state.threads.list().await)
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadSummary>, ApiError> {
    state
        .threads
        .list_thread(&ThreadId::from_string(id))
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Run one user turn
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<ReplyResponse>, ApiError> {
    if payload.content.trim().is_empty() {
        return Err(bad_request("Message content must not be empty"));
    }

    let reply = state
        .threads
        .send_message(&ThreadId::from_string(id), payload.content)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(reply.into()))
}

/// Opening message on a thread with no turns yet
pub async fn greet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let reply = state
        .threads
        .greet(&ThreadId::from_string(id))
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(reply.into()))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    state
        .threads
        .history(&ThreadId::from_string(id))
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Rebind a thread to another backend
pub async fn set_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<BindRequest>,
) -> Result<Json<ThreadResponse>, ApiError> {
    let thread = state
        .threads
        .rebind(&ThreadId::from_string(id), &payload.provider_id, &payload.options())
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(ThreadResponse::from(&thread)))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .threads
        .remove(&ThreadId::from_string(id))
        .await
        .map_err(|e| api_error(&e))?;

    Ok(StatusCode::NO_CONTENT)
}
