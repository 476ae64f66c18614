// SPDX-License-Identifier: MIT

use super::Source;
use crate::adk::error::CapabilityError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_MAX_RESULTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: String,
    /// Search rank, lowest first
    #[serde(default)]
    index: u32,
}

/// Wikipedia article search via the MediaWiki action API.
///
/// One fragment per matching article: its title followed by the plain-text
/// introduction.
pub struct WikipediaSource {
    client: Client,
    lang: String,
    max_results: u32,
}

impl WikipediaSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            lang: "en".to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    fn api_url(&self) -> String {
        format!("https://{}.wikipedia.org/w/api.php", self.lang)
    }
}

/// Turn an action API response into ranked fragments
fn pages_to_fragments(resp: QueryResponse) -> Vec<String> {
    let mut pages: Vec<Page> = resp
        .query
        .map(|q| q.pages.into_values().collect())
        .unwrap_or_default();
    pages.sort_by_key(|p| p.index);

    pages
        .into_iter()
        .filter(|p| !p.extract.trim().is_empty())
        .map(|p| format!("{}\n\n{}", p.title, p.extract.trim()))
        .collect()
}

#[async_trait]
impl Source for WikipediaSource {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Searches Wikipedia and returns plain-text introductions of matching articles."
    }

    async fn fetch(&self, query: &str) -> Result<Vec<String>, CapabilityError> {
        if query.trim().is_empty() {
            return Err(CapabilityError::invalid_input("wikipedia", "query is empty"));
        }

        let limit = self.max_results.to_string();
        let resp = self
            .client
            .get(self.api_url())
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", "max"),
            ])
            .send()
            .await
            .map_err(|e| CapabilityError::call_failed("wikipedia", e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CapabilityError::call_failed(
                "wikipedia",
                format!("Wikipedia API returned {}", resp.status()),
            ));
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| CapabilityError::call_failed("wikipedia", e.to_string()))?;

        let articles = pages_to_fragments(body);
        log::debug!("Wikipedia returned {} articles for '{}'", articles.len(), query);
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pages_sorted_by_search_rank() {
        let resp: QueryResponse = serde_json::from_value(json!({
            "batchcomplete": "",
            "query": {
                "pages": {
                    "24544": {
                        "pageid": 24544,
                        "title": "Photosynthesis",
                        "index": 1,
                        "extract": "Photosynthesis is a process used by plants."
                    },
                    "99": {
                        "pageid": 99,
                        "title": "Chlorophyll",
                        "index": 2,
                        "extract": "Chlorophyll is a green pigment."
                    },
                    "7": {
                        "pageid": 7,
                        "title": "Empty stub",
                        "index": 3,
                        "extract": "   "
                    }
                }
            }
        }))
        .unwrap();

        let fragments = pages_to_fragments(resp);
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].starts_with("Photosynthesis\n\n"));
        assert!(fragments[1].starts_with("Chlorophyll\n\n"));
    }

    #[test]
    fn test_no_results() {
        let resp: QueryResponse = serde_json::from_value(json!({"batchcomplete": ""})).unwrap();
        assert!(pages_to_fragments(resp).is_empty());
    }

    #[test]
    fn test_api_url_uses_lang() {
        let source = WikipediaSource::new(Client::new()).with_lang("de");
        assert_eq!(source.api_url(), "https://de.wikipedia.org/w/api.php");
    }
}
