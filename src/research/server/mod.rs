// SPDX-License-Identifier: MIT

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{ResearchError, StoreError};
use crate::research::config::ResearchConfig;
use crate::research::critic::KeywordCritic;
use crate::research::retriever::SourceRetriever;
use crate::research::sources::SourceRegistry;
use crate::research::store::{ResearchSession, Role, SessionHistory, Storage};
use crate::research::summarizer;
use crate::research::workflow::{
    Capabilities, ResearchEngine, ResearchState, RunOutcome, RunStatus,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NO_SUMMARY_MESSAGE: &str = "No summary could be produced for this query.";

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub engine: Arc<ResearchEngine>,
    pub config: Arc<ResearchConfig>,
}

impl AppState {
    /// Open the store and wire the production capabilities into an engine
    pub async fn from_config(config: ResearchConfig) -> Result<Self, ResearchError> {
        let storage = Storage::new(&config.database_url).await?;
        let registry = SourceRegistry::with_defaults(&config).await?;

        let caps = Capabilities {
            retriever: Arc::new(SourceRetriever::new(registry)),
            summarizer: summarizer::from_config(&config),
            critic: Arc::new(KeywordCritic::new(config.rejected_phrases.clone())),
            store: Arc::new(storage.clone()),
        };
        let engine = ResearchEngine::from_capabilities(caps, &config)?;

        Ok(Self {
            storage,
            engine: Arc::new(engine),
            config: Arc::new(config),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/history/{user_id}", get(history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: ResearchConfig) -> Result<(), ResearchError> {
    let port = config.port;
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ==================== errors ====================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ==================== payloads ====================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: i64,
    pub query: String,
}

impl ChatRequest {
    /// Check the request and return the trimmed query
    fn validate(&self, max_query_chars: usize) -> Result<&str, ApiError> {
        if self.user_id <= 0 {
            return Err(ApiError::BadRequest(
                "user_id must be a positive integer".to_string(),
            ));
        }
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }
        if query.chars().count() > max_query_chars {
            return Err(ApiError::BadRequest(format!(
                "query must be at most {} characters",
                max_query_chars
            )));
        }
        Ok(query)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: i64,
    pub result: String,
    pub saved: bool,
    pub status: RunStatus,
    pub summarize_attempts: u32,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ChatResponse {
    fn from_outcome(outcome: RunOutcome) -> Self {
        let state = outcome.state;
        let result = state.summary.unwrap_or_default();
        let message = if result.trim().is_empty() {
            Some(NO_SUMMARY_MESSAGE.to_string())
        } else {
            state.error
        };

        Self {
            session_id: state.session_id,
            result,
            saved: state.saved.unwrap_or(false),
            status: outcome.status,
            summarize_attempts: state.summarize_attempts,
            warnings: state.warnings,
            message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistorySession {
    pub session_id: i64,
    pub query: String,
    pub created_at: String,
    pub messages: Vec<HistoryMessage>,
}

impl From<SessionHistory> for HistorySession {
    fn from(history: SessionHistory) -> Self {
        Self {
            session_id: history.session.id,
            query: history.session.query,
            created_at: history.session.created_at.format(TIMESTAMP_FORMAT).to_string(),
            messages: history
                .messages
                .into_iter()
                .map(|m| HistoryMessage {
                    role: m.role,
                    content: m.content,
                    timestamp: m.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                })
                .collect(),
        }
    }
}

// ==================== handlers ====================

async fn root() -> Json<Value> {
    Json(json!({ "message": "AI Research Orchestrator API running" }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "message": "History API is working" }))
}

/// Create the user if needed and open a session for the query
async fn start_session(
    state: &AppState,
    user_id: i64,
    query: &str,
) -> Result<ResearchSession, ApiError> {
    let store_failure = |e: StoreError| {
        log::error!("Failed to open research session: {}", e);
        ApiError::Internal("Database error".to_string())
    };

    state
        .storage
        .ensure_user(user_id)
        .await
        .map_err(store_failure)?;
    state
        .storage
        .create_session(user_id, query)
        .await
        .map_err(store_failure)
}

/// Record a run that died outside the engine against its session
async fn report_run_failure(storage: &Storage, session_id: i64, reason: &str) -> ApiError {
    log::error!("Research run for session {} failed: {}", session_id, reason);
    if let Err(e) = storage
        .append_message(
            session_id,
            Role::System,
            &format!("Research run failed: {}", reason),
        )
        .await
    {
        log::error!("Failed to record run failure for session {}: {}", session_id, e);
    }
    ApiError::Internal("Research run failed".to_string())
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let query = request.validate(state.config.max_query_chars)?;
    let session = start_session(&state, request.user_id, query).await?;

    let engine = state.engine.clone();
    let initial = ResearchState::new(query, request.user_id, session.id);
    let outcome = match tokio::spawn(async move { engine.run(initial).await }).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(report_run_failure(&state.storage, session.id, &e.to_string()).await),
    };

    Ok(Json(ChatResponse::from_outcome(outcome)))
}

async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let Json(request) = payload?;
    let query = request.validate(state.config.max_query_chars)?;
    let session = start_session(&state, request.user_id, query).await?;

    let (tx, rx) = mpsc::channel(100);
    let cancel = CancellationToken::new();
    let initial = ResearchState::new(query, request.user_id, session.id);
    let engine = state.engine.clone();
    let storage = state.storage.clone();
    let run_cancel = cancel.clone();

    tokio::spawn(async move {
        log::info!("Starting streaming research run for session {}", session.id);
        let run = tokio::spawn(async move { engine.run_with(initial, run_cancel, Some(tx)).await });
        if let Err(e) = run.await {
            let _ = report_run_failure(&storage, session.id, &e.to_string()).await;
        }
    });

    // Dropping the response body (client went away) cancels the run
    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Event::default().json_data(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}

async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<HistorySession>>, ApiError> {
    let sessions = state.storage.history(user_id).await.map_err(|e| {
        log::error!("Database error in history for user {}: {}", user_id, e);
        ApiError::Internal("Database error".to_string())
    })?;

    Ok(Json(sessions.into_iter().map(HistorySession::from).collect()))
}
