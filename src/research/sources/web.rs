// SPDX-License-Identifier: MIT

use super::Source;
use crate::adk::error::CapabilityError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const DEFAULT_COUNT: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
}

impl SearchResult {
    fn to_fragment(&self) -> String {
        format!("{} ({})\n{}", self.title, self.url, self.description)
    }
}

pub struct BraveSearchSource {
    client: Client,
    api_key: String,
    count: u32,
}

impl BraveSearchSource {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            count: DEFAULT_COUNT,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.min(20);
        self
    }
}

fn parse_results(body: &Value) -> Result<Vec<SearchResult>, CapabilityError> {
    let results_json = body
        .get("web")
        .and_then(|w| w.get("results"))
        .ok_or_else(|| {
            CapabilityError::call_failed("web", "Invalid response format: missing web.results")
        })?;

    serde_json::from_value(results_json.clone())
        .map_err(|e| CapabilityError::call_failed("web", e.to_string()))
}

#[async_trait]
impl Source for BraveSearchSource {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Searches the web using Brave Search API. Returns titles, URLs, and descriptions."
    }

    async fn fetch(&self, query: &str) -> Result<Vec<String>, CapabilityError> {
        if query.trim().is_empty() {
            return Err(CapabilityError::invalid_input("web", "query is empty"));
        }

        let mut url = reqwest::Url::parse(BRAVE_SEARCH_URL)
            .map_err(|e| CapabilityError::unavailable("web", e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &self.count.to_string());

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| CapabilityError::call_failed("web", e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::call_failed(
                "web",
                format!("Brave API error: {}", text),
            ));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| CapabilityError::call_failed("web", e.to_string()))?;

        Ok(parse_results(&body)?
            .iter()
            .map(SearchResult::to_fragment)
            .collect())
    }
}
