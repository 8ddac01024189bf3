//! HTTP server - chat and session endpoints over the shared state.
//!
//! Endpoints:
//! - GET  /health - liveness plus agent readiness
//! - POST /api/chat - execute one chat turn
//! - POST /api/sessions - create a session
//! - GET  /api/sessions - list sessions, most recently updated first
//! - GET  /api/sessions/{id} - session summary
//! - DELETE /api/sessions/{id} - delete a session
//!
//! The store and the agent manager are constructed once at startup and
//! injected through the router state; handlers never reach for globals.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::agent::{AgentError, AgentManager};
use crate::config::{AgentConfig, ServerConfig};
use crate::conversation::{assemble, TurnContext};
use crate::models::{ChatMessage, LastResponse, MessageRole, SessionSummary, TokenUsage};
use crate::store::{SessionStore, StoreError};

/// Shared server state.
pub struct AppState {
    /// Session table, mutated from one request context per operation.
    pub store: RwLock<SessionStore>,
    /// Owner of the tool-server subprocess.
    pub agent: AgentManager,
}

/// An error response: `{"error": ...}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::not_found(err.to_string()),
            StoreError::InvalidId(_) => Self::bad_request(err.to_string()),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = if err.is_initialization() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

// === Request/Response Types ===

/// Request to the chat endpoint. Beyond the session id and message, a
/// caller may supply explicit conversation context; see
/// [`crate::conversation::assemble`] for the precedence rules.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Session to continue. Unknown ids are created implicitly, keeping
    /// the caller-supplied id; absent means a fresh session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// The user's message.
    pub message: String,
    /// Optional system prompt prefix.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Optional initial message list, used instead of stored history.
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    /// Optional explicit full conversation, used verbatim.
    #[serde(default)]
    pub conversation: Option<Vec<ChatMessage>>,
}

/// Response from the chat endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub tools: HashMap<String, u64>,
    pub tokens: TokenUsage,
    pub time_ms: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_initialized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

// === Server Lifecycle ===

/// Start the server and block until shutdown.
///
/// A failing agent start is deliberately not fatal: the service boots
/// degraded, `/health` reports `agent_initialized: false`, and the first
/// chat request retries initialization.
pub async fn run(server_config: ServerConfig, agent_config: AgentConfig) -> Result<()> {
    let store = SessionStore::new(server_config.session_dir.clone());
    info!("session store ready, {} session(s) loaded", store.len());

    let state = Arc::new(AppState {
        store: RwLock::new(store),
        agent: AgentManager::new(agent_config),
    });

    if let Err(e) = state.agent.ensure_ready().await {
        warn!("agent not started at boot, will retry on first chat: {e}");
    }

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                server_config.host, server_config.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("tabletalk server listening on http://{addr}");

    let app = router(Arc::clone(&state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.agent.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

/// Build the router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Handlers ===

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        agent_initialized: state.agent.is_ready().await,
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }

    let handle = state.agent.ensure_ready().await.map_err(|e| {
        warn!("agent unavailable for chat: {e}");
        ApiError::from(e)
    })?;

    let session_id = {
        let mut store = state.store.write().await;
        match req.session_id {
            Some(id) => {
                if store.get(&id).is_none() {
                    store.create_with_id(&id)?;
                }
                id
            }
            None => store.create(),
        }
    };

    let history = state.store.read().await.conversation_for(&session_id);
    let context = TurnContext {
        conversation: req.conversation,
        system_prompt: req.system_prompt,
        messages: req.messages,
    };
    let input = assemble(&context, history.as_deref(), &req.message);

    let turn = handle.run_turn(&input).await.map_err(|e| {
        error!("turn failed for session {session_id}: {e}");
        ApiError::from(e)
    })?;

    {
        let mut store = state.store.write().await;
        store.append_message(&session_id, MessageRole::User, req.message.as_str(), None)?;
        store.append_message(
            &session_id,
            MessageRole::Assistant,
            turn.text.as_str(),
            Some(LastResponse::from_turn(&turn)),
        )?;
    }

    let time_ms = turn.time_ms();
    Ok(Json(ChatResponse {
        session_id,
        response: turn.text,
        tools: turn.tools,
        tokens: turn.usage,
        time_ms,
    }))
}

async fn create_session(State(state): State<Arc<AppState>>) -> Json<CreateSessionResponse> {
    let session_id = state.store.write().await.create();
    Json(CreateSessionResponse { session_id })
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.store.read().await.list(),
    })
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    state
        .store
        .read()
        .await
        .get(&id)
        .map(|s| Json(s.summary()))
        .ok_or_else(|| ApiError::not_found(format!("session {id} not found")))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.store.write().await.delete(&id) {
        Ok(Json(
            serde_json::json!({ "message": format!("session {id} deleted") }),
        ))
    } else {
        Err(ApiError::not_found(format!("session {id} not found")))
    }
}
