//! Integration tests for the research workflow and HTTP API
//!
//! These tests run the real engine, retriever, summarizer, critic and SQLite
//! store end to end, with mock sources and a mock model at the edges.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use research_orchestrator::adk::error::{CapabilityError, ModelError};
use research_orchestrator::adk::model::{Content, GenerationConfig, Model, Part};
use research_orchestrator::research::config::ResearchConfig;
use research_orchestrator::research::critic::KeywordCritic;
use research_orchestrator::research::retriever::{SourceResult, SourceRetriever};
use research_orchestrator::research::server::{router, AppState};
use research_orchestrator::research::sources::{Source, SourceRegistry, UnavailableSource};
use research_orchestrator::research::store::Storage;
use research_orchestrator::research::summarizer::{LlmSummarizer, Summarizer};
use research_orchestrator::research::workflow::{
    Capabilities, ResearchEngine, ResearchState, RunStatus, Step,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Mock Components
// ============================================================================

/// Mock source that returns fixed fragments
struct MockSource {
    name: String,
    fragments: Vec<String>,
}

impl MockSource {
    fn new(name: &str, fragments: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock source"
    }

    async fn fetch(&self, _query: &str) -> Result<Vec<String>, CapabilityError> {
        Ok(self.fragments.clone())
    }
}

/// Mock model that plays back scripted replies; `None` is a provider error
struct MockModel {
    replies: Vec<Option<String>>,
    calls: AtomicUsize,
}

impl MockModel {
    fn new(replies: Vec<Option<&str>>) -> Self {
        Self {
            replies: replies.into_iter().map(|r| r.map(str::to_string)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn answering(text: &str) -> Self {
        Self::new(vec![Some(text)])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_content(
        &self,
        _history: &[Content],
        _config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = &self.replies[idx.min(self.replies.len() - 1)];
        match reply {
            Some(text) => Ok(Content {
                role: "model".to_string(),
                parts: vec![Part::Text(text.clone())],
            }),
            None => Err(ModelError::Api {
                provider: "OpenAI".to_string(),
                status: 502,
                body: "Bad Gateway".to_string(),
            }),
        }
    }
}

/// Summarizer that brings down the task running the workflow
struct PanickingSummarizer;

#[async_trait]
impl Summarizer for PanickingSummarizer {
    async fn summarize(&self, _text: &str, _max_words: usize) -> Result<String, CapabilityError> {
        panic!("summarizer crashed");
    }
}

fn test_config() -> ResearchConfig {
    ResearchConfig {
        sources: vec![
            "arxiv".to_string(),
            "wikipedia".to_string(),
            "web".to_string(),
        ],
        ..Default::default()
    }
}

async fn test_registry() -> SourceRegistry {
    let registry = SourceRegistry::new();
    registry
        .register(Arc::new(MockSource::new(
            "arxiv",
            &["Title: Light reactions\n\nChlorophyll absorbs photons."],
        )))
        .await;
    registry
        .register(Arc::new(MockSource::new(
            "wikipedia",
            &["Photosynthesis\n\nPlants convert light into chemical energy."],
        )))
        .await;
    registry
        .register(Arc::new(UnavailableSource::new(
            "web",
            "Web search unavailable. BRAVE_API_KEY must be set",
        )))
        .await;
    registry
}

async fn test_app(summarizer: Arc<dyn Summarizer>) -> AppState {
    let config = test_config();
    let storage = Storage::in_memory().await.unwrap();
    let caps = Capabilities {
        retriever: Arc::new(SourceRetriever::new(test_registry().await)),
        summarizer,
        critic: Arc::new(KeywordCritic::default()),
        store: Arc::new(storage.clone()),
    };
    let engine = ResearchEngine::from_capabilities(caps, &config).unwrap();

    AppState {
        storage,
        engine: Arc::new(engine),
        config: Arc::new(config),
    }
}

fn llm_summarizer(model: Arc<MockModel>) -> Arc<dyn Summarizer> {
    Arc::new(LlmSummarizer::new(model, 8000, 0.0))
}

async fn send(app: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(app.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Engine Tests
// ============================================================================

#[tokio::test]
async fn test_photosynthesis_run_persists_one_exchange() {
    let model = Arc::new(MockModel::answering("Plants convert light..."));
    let app = test_app(llm_summarizer(model.clone())).await;
    app.storage.ensure_user(1).await.unwrap();
    let session = app
        .storage
        .create_session(1, "photosynthesis basics")
        .await
        .unwrap();

    let outcome = app
        .engine
        .run(ResearchState::new("photosynthesis basics", 1, session.id))
        .await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, Step::ALL.to_vec());
    assert_eq!(outcome.state.saved, Some(true));
    assert_eq!(model.calls(), 1);

    let docs = outcome.state.retrieved_docs.unwrap();
    assert_eq!(
        docs["web"],
        SourceResult::Error(
            "web access unavailable: Web search unavailable. BRAVE_API_KEY must be set"
                .to_string()
        )
    );

    let messages = app.storage.list_messages(session.id).await.unwrap();
    let log: Vec<(&str, &str)> = messages
        .iter()
        .map(|m| (m.role.as_str(), m.content.as_str()))
        .collect();
    assert_eq!(
        log,
        vec![
            ("user", "photosynthesis basics"),
            ("assistant", "Plants convert light..."),
        ]
    );
    assert_eq!(app.storage.list_summaries(session.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_model_failure_is_retried_through_critic() {
    let model = Arc::new(MockModel::new(vec![None, Some("A recovered summary.")]));
    let app = test_app(llm_summarizer(model.clone())).await;
    app.storage.ensure_user(1).await.unwrap();
    let session = app.storage.create_session(1, "q").await.unwrap();

    let outcome = app.engine.run(ResearchState::new("q", 1, session.id)).await;

    assert_eq!(outcome.state.summarize_attempts, 2);
    assert_eq!(outcome.state.summary.as_deref(), Some("A recovered summary."));

    let summaries = app.storage.list_summaries(session.id).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].summary, "A recovered summary.");
}

#[tokio::test]
async fn test_persist_failure_is_reported_not_fatal() {
    let model = Arc::new(MockModel::answering("Fine."));
    let app = test_app(llm_summarizer(model)).await;

    // no session row exists, so the foreign key rejects the writes
    let outcome = app.engine.run(ResearchState::new("q", 1, 999)).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.state.saved, Some(false));
    assert!(outcome
        .state
        .error
        .as_deref()
        .unwrap()
        .starts_with("Failed to save:"));
    assert_eq!(outcome.state.summary.as_deref(), Some("Fine."));
}

// ============================================================================
// HTTP API Tests
// ============================================================================

#[tokio::test]
async fn test_root_and_health() {
    let app = test_app(llm_summarizer(Arc::new(MockModel::answering("x")))).await;

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "AI Research Orchestrator API running"}));

    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_chat_returns_summary_and_creates_user() {
    let app = test_app(llm_summarizer(Arc::new(MockModel::answering(
        "Plants convert light...",
    ))))
    .await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/chat",
            json!({"user_id": 7, "query": "photosynthesis basics"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "Plants convert light...");
    assert_eq!(body["saved"], true);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["summarize_attempts"], 1);
    assert!(body.get("message").is_none());

    let user = app.storage.get_user(7).await.unwrap();
    assert_eq!(user.name, "User 7");
    let session_id = body["session_id"].as_i64().unwrap();
    assert_eq!(app.storage.list_messages(session_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_chat_rejects_invalid_input() {
    let app = test_app(llm_summarizer(Arc::new(MockModel::answering("x")))).await;

    let (status, body) = send(&app, post_json("/api/chat", json!({"user_id": 0, "query": "q"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "user_id must be a positive integer");

    let (status, _) = send(&app, post_json("/api/chat", json!({"user_id": 1, "query": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long = "a".repeat(1001);
    let (status, _) = send(&app, post_json("/api/chat", json!({"user_id": 1, "query": long}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, post_json("/api/chat", json!({"query": "q"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    // nothing was recorded for rejected requests
    assert!(app.storage.list_sessions(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_lists_sessions_newest_first() {
    let app = test_app(llm_summarizer(Arc::new(MockModel::answering("Summary.")))).await;

    for query in ["first question", "second question"] {
        let (status, _) = send(&app, post_json("/api/chat", json!({"user_id": 3, "query": query}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, get("/api/history/3")).await;
    assert_eq!(status, StatusCode::OK);

    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["query"], "second question");
    assert_eq!(sessions[1]["query"], "first question");

    let messages = sessions[0]["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "second question");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Summary.");

    // %Y-%m-%d %H:%M:%S
    let timestamp = messages[0]["timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 19);
    assert_eq!(&timestamp[10..11], " ");
}

#[tokio::test]
async fn test_history_of_unknown_user_is_empty() {
    let app = test_app(llm_summarizer(Arc::new(MockModel::answering("x")))).await;

    let (status, body) = send(&app, get("/api/history/12345")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_crashed_run_records_system_message() {
    let app = test_app(Arc::new(PanickingSummarizer)).await;

    let (status, body) = send(&app, post_json("/api/chat", json!({"user_id": 5, "query": "q"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Research run failed");

    let sessions = app.storage.list_sessions(5).await.unwrap();
    assert_eq!(sessions.len(), 1);
    let messages = app.storage.list_messages(sessions[0].id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "system");
    assert!(messages[0].content.starts_with("Research run failed"));
}

#[tokio::test]
async fn test_chat_stream_emits_run_events() {
    let app = test_app(llm_summarizer(Arc::new(MockModel::answering("Streamed.")))).await;

    let response = router(app.clone())
        .oneshot(post_json("/api/chat/stream", json!({"user_id": 2, "query": "q"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect();

    assert_eq!(events.first().unwrap()["type"], "run_started");
    let last = events.last().unwrap();
    assert_eq!(last["type"], "completed");
    assert_eq!(last["summary"], "Streamed.");
    assert_eq!(last["saved"], true);
    assert!(events
        .iter()
        .any(|e| e["type"] == "verdict" && e["ok"] == true));
}
