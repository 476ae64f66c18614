// SPDX-License-Identifier: MIT

//! Workflow steps
//!
//! Each node wraps one capability. A node never fails: capability errors and
//! timeouts are written into the state field the node owns.

use crate::adk::error::CapabilityError;
use crate::research::critic::Critic;
use crate::research::retriever::{RetrievedDocs, Retriever, SourceResult};
use crate::research::store::ResearchStore;
use crate::research::summarizer::Summarizer;
use crate::research::workflow::graph::Step;
use crate::research::workflow::state::ResearchState;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Written to `summary` when retrieval produced no text at all
pub const NO_CONTENT_FOUND: &str = "No content found to summarize.";

/// A step implementation bound into the engine
#[async_trait]
pub trait Node: Send + Sync {
    /// The graph step this node implements
    fn step(&self) -> Step;

    /// Consume the current state and return the next one
    async fn run(&self, state: ResearchState) -> ResearchState;
}

/// Bound a capability call by `limit`, reporting expiry as a call failure
async fn with_timeout<T, F>(capability: &str, limit: Duration, call: F) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::call_failed(
            capability,
            format!("timed out after {:?}", limit),
        )),
    }
}

/// Join retrieved content into one blob, one `--- SOURCE ---` section per
/// source. A failed source contributes its error text; a source that came
/// back blank is left out.
pub fn combine_documents(docs: &RetrievedDocs) -> String {
    let mut combined = String::new();
    for (source, result) in docs {
        let body = match result {
            SourceResult::Documents(fragments) => fragments.join("\n"),
            SourceResult::Error(message) => message.clone(),
        };
        if body.trim().is_empty() {
            continue;
        }
        combined.push_str(&format!("\n--- {} ---\n", source.to_uppercase()));
        combined.push_str(&body);
    }
    combined
}

// ==================== fetch ====================

pub struct FetchNode {
    retriever: Arc<dyn Retriever>,
    sources: Vec<String>,
    timeout: Duration,
}

impl FetchNode {
    pub fn new(retriever: Arc<dyn Retriever>, sources: Vec<String>, timeout: Duration) -> Self {
        Self {
            retriever,
            sources,
            timeout,
        }
    }
}

#[async_trait]
impl Node for FetchNode {
    fn step(&self) -> Step {
        Step::Fetch
    }

    async fn run(&self, mut state: ResearchState) -> ResearchState {
        let result = with_timeout(
            "retriever",
            self.timeout,
            self.retriever.retrieve(&state.query, &self.sources),
        )
        .await;

        let docs = match result {
            Ok(docs) => docs,
            Err(e) => {
                log::error!("Retrieval failed: {}", e);
                RetrievedDocs::from([(
                    "error".to_string(),
                    SourceResult::Error(format!("Failed to retrieve documents: {}", e.message())),
                )])
            }
        };

        state.retrieved_docs = Some(docs);
        state
    }
}

// ==================== summarize ====================

pub struct SummarizeNode {
    summarizer: Arc<dyn Summarizer>,
    max_words: usize,
    timeout: Duration,
}

impl SummarizeNode {
    pub fn new(summarizer: Arc<dyn Summarizer>, max_words: usize, timeout: Duration) -> Self {
        Self {
            summarizer,
            max_words,
            timeout,
        }
    }
}

#[async_trait]
impl Node for SummarizeNode {
    fn step(&self) -> Step {
        Step::Summarize
    }

    async fn run(&self, mut state: ResearchState) -> ResearchState {
        state.summarize_attempts += 1;

        let combined = state
            .retrieved_docs
            .as_ref()
            .map(combine_documents)
            .unwrap_or_default();

        let summary = if combined.trim().is_empty() {
            log::info!("Nothing retrieved; skipping summarizer");
            NO_CONTENT_FOUND.to_string()
        } else {
            let result = with_timeout(
                "summarizer",
                self.timeout,
                self.summarizer.summarize(&combined, self.max_words),
            )
            .await;
            match result {
                Ok(summary) => summary,
                Err(e) => {
                    log::error!("Summarization failed: {}", e);
                    format!("Error generating summary: {}", e)
                }
            }
        };

        state.summary = Some(summary);
        state
    }
}

// ==================== critic ====================

pub struct CriticNode {
    critic: Arc<dyn Critic>,
}

impl CriticNode {
    pub fn new(critic: Arc<dyn Critic>) -> Self {
        Self { critic }
    }
}

#[async_trait]
impl Node for CriticNode {
    fn step(&self) -> Step {
        Step::Critic
    }

    async fn run(&self, mut state: ResearchState) -> ResearchState {
        let verdict = self.critic.critique(state.summary_text());
        if verdict.ok {
            log::info!("Critic accepted summary: {}", verdict.reason);
        } else {
            log::warn!("Critic rejected summary: {}", verdict.reason);
        }
        state.critic_review = Some(verdict);
        state
    }
}

// ==================== persist ====================

pub struct PersistNode {
    store: Arc<dyn ResearchStore>,
    timeout: Duration,
}

impl PersistNode {
    pub fn new(store: Arc<dyn ResearchStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn save(&self, state: &ResearchState) -> Result<(), CapabilityError> {
        let store_call = |e: crate::adk::error::StoreError| {
            CapabilityError::call_failed("store", e.to_string())
        };

        with_timeout("store", self.timeout, async {
            self.store
                .save_user_message(state.session_id, &state.query)
                .await
                .map_err(store_call)
        })
        .await?;

        if let Some(summary) = &state.summary {
            with_timeout("store", self.timeout, async {
                self.store
                    .save_assistant_summary(state.session_id, summary)
                    .await
                    .map_err(store_call)
            })
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Node for PersistNode {
    fn step(&self) -> Step {
        Step::Persist
    }

    async fn run(&self, mut state: ResearchState) -> ResearchState {
        match self.save(&state).await {
            Ok(()) => {
                log::info!("Saved session {}", state.session_id);
                state.saved = Some(true);
            }
            Err(e) => {
                log::error!("Failed to save session {}: {}", state.session_id, e);
                state.saved = Some(false);
                state.error = Some(format!("Failed to save: {}", e.message()));
            }
        }
        state
    }
}
