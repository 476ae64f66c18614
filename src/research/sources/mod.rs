// SPDX-License-Identifier: MIT

//! Document sources queried by the retriever
//!
//! Each source is one third-party index (arXiv, Wikipedia, web search)
//! behind the [`Source`] trait, looked up by name in a [`SourceRegistry`].

pub mod arxiv;
pub mod web;
pub mod wikipedia;

use crate::adk::error::CapabilityError;
use crate::research::config::ResearchConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A searchable document index.
///
/// `name()` and `description()` return `&str`; implementations store them in
/// struct fields or return literals.
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns the source name used in requests and in `retrieved_docs`
    fn name(&self) -> &str;

    /// Returns a human-readable description of the index
    fn description(&self) -> &str;

    /// Fetch text fragments relevant to `query`
    async fn fetch(&self, query: &str) -> Result<Vec<String>, CapabilityError>;
}

/// A source whose backend is not configured; every fetch reports it unavailable
pub struct UnavailableSource {
    name: String,
    reason: String,
}

impl UnavailableSource {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Source for UnavailableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.reason
    }

    async fn fetch(&self, _query: &str) -> Result<Vec<String>, CapabilityError> {
        Err(CapabilityError::unavailable(&self.name, &self.reason))
    }
}

#[derive(Clone)]
pub struct SourceRegistry {
    sources: Arc<RwLock<HashMap<String, Arc<dyn Source>>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, source: Arc<dyn Source>) {
        let mut sources = self.sources.write().await;
        sources.insert(source.name().to_string(), source);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Source>> {
        let sources = self.sources.read().await;
        sources.get(name).cloned()
    }

    /// Registered source names, sorted
    pub async fn names(&self) -> Vec<String> {
        let sources = self.sources.read().await;
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registry with arXiv, Wikipedia and web search.
    ///
    /// Web search needs `BRAVE_API_KEY`; without it `web` is registered as
    /// unavailable so requests for it degrade instead of being unknown.
    pub async fn with_defaults(config: &ResearchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.step_timeout())
            .user_agent(concat!("research-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let limit = config.max_results_per_source;
        let registry = Self::new();
        registry
            .register(Arc::new(
                arxiv::ArxivSource::new(client.clone()).with_max_results(limit),
            ))
            .await;
        registry
            .register(Arc::new(
                wikipedia::WikipediaSource::new(client.clone())
                    .with_lang(config.wikipedia_lang.as_str())
                    .with_max_results(limit),
            ))
            .await;

        match config.brave_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                log::info!("Registered source: web (Brave Search)");
                registry
                    .register(Arc::new(
                        web::BraveSearchSource::new(client, key).with_count(limit),
                    ))
                    .await;
            }
            _ => {
                log::warn!("BRAVE_API_KEY not set; web source unavailable");
                registry
                    .register(Arc::new(UnavailableSource::new(
                        "web",
                        "Web search unavailable. BRAVE_API_KEY must be set",
                    )))
                    .await;
            }
        }

        Ok(registry)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
