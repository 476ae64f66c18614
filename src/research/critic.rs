// SPDX-License-Identifier: MIT

//! Critic capability - catches degenerate summaries before they are saved

use serde::{Deserialize, Serialize};

/// Pass/fail verdict on a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticVerdict {
    pub ok: bool,
    pub reason: String,
}

impl CriticVerdict {
    pub fn accept(reason: impl Into<String>) -> Self {
        Self {
            ok: true,
            reason: reason.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// A critic is a pure function of the summary text and always answers
pub trait Critic: Send + Sync {
    fn critique(&self, summary: &str) -> CriticVerdict;
}

/// Prefixes the summarize step writes when it could not produce a summary
const DEGRADED_PREFIXES: &[&str] = &["Error generating summary:", "Error summarizing"];

/// Keyword-based critic.
///
/// Rejects empty summaries, summaries containing a filler phrase, and
/// summaries that are only an error description.
pub struct KeywordCritic {
    rejected_phrases: Vec<String>,
}

impl KeywordCritic {
    pub fn new(rejected_phrases: Vec<String>) -> Self {
        Self {
            rejected_phrases: rejected_phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordCritic {
    fn default() -> Self {
        Self::new(vec!["lorem ipsum".to_string()])
    }
}

impl Critic for KeywordCritic {
    fn critique(&self, summary: &str) -> CriticVerdict {
        let trimmed = summary.trim();
        if trimmed.is_empty() {
            return CriticVerdict::reject("Summary is empty");
        }

        if DEGRADED_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return CriticVerdict::reject("Summary generation failed");
        }

        let lowered = trimmed.to_lowercase();
        if self.rejected_phrases.iter().any(|p| lowered.contains(p)) {
            return CriticVerdict::reject("Hallucination detected (nonsense text)");
        }

        CriticVerdict::accept("Looks fine")
    }
}
