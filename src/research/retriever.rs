// SPDX-License-Identifier: MIT

//! Retriever capability - fans one query out to named sources

use crate::adk::error::CapabilityError;
use crate::research::sources::SourceRegistry;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome for one source: its text fragments or a description of the failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceResult {
    Documents(Vec<String>),
    Error(String),
}

impl SourceResult {
    pub fn is_error(&self) -> bool {
        matches!(self, SourceResult::Error(_))
    }
}

/// Per-source results keyed by source name
pub type RetrievedDocs = BTreeMap<String, SourceResult>;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Query every named source. Each source fails on its own; only a request
    /// that cannot be attempted at all returns `Err`.
    async fn retrieve(
        &self,
        query: &str,
        sources: &[String],
    ) -> Result<RetrievedDocs, CapabilityError>;
}

/// Retriever backed by a [`SourceRegistry`], querying sources concurrently
pub struct SourceRetriever {
    registry: SourceRegistry,
}

impl SourceRetriever {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry }
    }

    async fn fetch_one(&self, query: &str, name: &str) -> SourceResult {
        let Some(source) = self.registry.get(name).await else {
            log::warn!("Unknown source requested: {}", name);
            return SourceResult::Error(format!("Unknown source: {}", name));
        };

        match source.fetch(query).await {
            Ok(docs) => SourceResult::Documents(docs),
            Err(e) => {
                log::warn!("Source {} failed: {}", name, e);
                SourceResult::Error(describe_failure(name, &e))
            }
        }
    }
}

fn describe_failure(name: &str, err: &CapabilityError) -> String {
    match err {
        CapabilityError::Unavailable { message, .. } => {
            format!("{} access unavailable: {}", name, message)
        }
        CapabilityError::CallFailed { message, .. } => {
            format!("Error fetching from {}: {}", name, message)
        }
        CapabilityError::InvalidInput { message, .. } => {
            format!("Invalid request for {}: {}", name, message)
        }
    }
}

#[async_trait]
impl Retriever for SourceRetriever {
    async fn retrieve(
        &self,
        query: &str,
        sources: &[String],
    ) -> Result<RetrievedDocs, CapabilityError> {
        if sources.is_empty() {
            return Err(CapabilityError::invalid_input(
                "retriever",
                "no sources requested",
            ));
        }

        let fetches = sources.iter().map(|name| async move {
            let result = self.fetch_one(query, name).await;
            (name.clone(), result)
        });

        let results: RetrievedDocs = join_all(fetches).await.into_iter().collect();

        log::info!(
            "Retrieved from {} sources ({} failed)",
            results.len(),
            results.values().filter(|r| r.is_error()).count()
        );
        Ok(results)
    }
}
