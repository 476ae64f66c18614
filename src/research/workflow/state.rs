// SPDX-License-Identifier: MIT

//! Runtime state carried through one workflow run

use crate::research::critic::CriticVerdict;
use crate::research::retriever::RetrievedDocs;
use serde::{Deserialize, Serialize};

/// State of one research run.
///
/// The engine moves the value into each step and takes the returned value as
/// the next state. Steps only set or replace the fields they own; no step
/// clears a field another step wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    pub query: String,
    pub user_id: i64,
    pub session_id: i64,
    /// Owned by `fetch`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_docs: Option<RetrievedDocs>,
    /// Owned by `summarize`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Owned by `summarize`; number of times it has run
    #[serde(default)]
    pub summarize_attempts: u32,
    /// Owned by `critic`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critic_review: Option<CriticVerdict>,
    /// Owned by `persist`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved: Option<bool>,
    /// Owned by `persist`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Appended by the engine, never cleared
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ResearchState {
    /// Entry state; `session_id` must already exist in the store
    pub fn new(query: impl Into<String>, user_id: i64, session_id: i64) -> Self {
        Self {
            query: query.into(),
            user_id,
            session_id,
            retrieved_docs: None,
            summary: None,
            summarize_attempts: 0,
            critic_review: None,
            saved: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Whether the last critic verdict rejected the summary.
    /// A missing verdict counts as accepted.
    pub fn critic_rejected(&self) -> bool {
        self.critic_review.as_ref().is_some_and(|v| !v.ok)
    }

    /// The summary, or an empty string if none was produced
    pub fn summary_text(&self) -> &str {
        self.summary.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::retriever::SourceResult;
    use serde_json::json;

    #[test]
    fn test_new_state_has_only_entry_fields() {
        let state = ResearchState::new("photosynthesis basics", 1, 10);
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({
                "query": "photosynthesis basics",
                "user_id": 1,
                "session_id": 10,
                "summarize_attempts": 0
            })
        );
    }

    #[test]
    fn test_missing_verdict_is_not_rejection() {
        let mut state = ResearchState::new("q", 1, 1);
        assert!(!state.critic_rejected());

        state.critic_review = Some(CriticVerdict::reject("bad"));
        assert!(state.critic_rejected());

        state.critic_review = Some(CriticVerdict::accept("good"));
        assert!(!state.critic_rejected());
    }

    #[test]
    fn test_state_json_keeps_docs_shape() {
        let mut state = ResearchState::new("q", 1, 1);
        let mut docs = RetrievedDocs::new();
        docs.insert(
            "arxiv".to_string(),
            SourceResult::Documents(vec!["paper".to_string()]),
        );
        docs.insert(
            "web".to_string(),
            SourceResult::Error("Error fetching from web: 500".to_string()),
        );
        state.retrieved_docs = Some(docs);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["retrieved_docs"]["arxiv"], json!(["paper"]));
        assert_eq!(value["retrieved_docs"]["web"], json!("Error fetching from web: 500"));
    }
}
