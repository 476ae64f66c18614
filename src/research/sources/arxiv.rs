// SPDX-License-Identifier: MIT

use super::Source;
use crate::adk::error::CapabilityError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
const DEFAULT_MAX_RESULTS: u32 = 3;

static ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("valid entry regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("valid title regex"));
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").expect("valid summary regex"));

/// arXiv paper search through the public Atom API.
///
/// Each result becomes one fragment holding the paper title and abstract.
pub struct ArxivSource {
    client: Client,
    base_url: String,
    max_results: u32,
}

impl ArxivSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: ARXIV_API_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Extract `Title: ...` + abstract fragments from an Atom feed
pub(crate) fn parse_feed(xml: &str) -> Vec<String> {
    ENTRY_RE
        .captures_iter(xml)
        .filter_map(|entry| {
            let body = entry.get(1)?.as_str();
            let title = TITLE_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| clean_text(m.as_str()))
                .unwrap_or_default();
            let summary = SUMMARY_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| clean_text(m.as_str()))?;

            if summary.is_empty() {
                return None;
            }
            Some(if title.is_empty() {
                summary
            } else {
                format!("Title: {}\n\n{}", title, summary)
            })
        })
        .collect()
}

fn clean_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl Source for ArxivSource {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn description(&self) -> &str {
        "Searches arXiv for academic papers and returns their titles and abstracts."
    }

    async fn fetch(&self, query: &str) -> Result<Vec<String>, CapabilityError> {
        if query.trim().is_empty() {
            return Err(CapabilityError::invalid_input("arxiv", "query is empty"));
        }

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| CapabilityError::unavailable("arxiv", e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("search_query", &format!("all:{}", query))
            .append_pair("start", "0")
            .append_pair("max_results", &self.max_results.to_string());

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CapabilityError::call_failed("arxiv", e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CapabilityError::call_failed(
                "arxiv",
                format!("arXiv API returned {}", resp.status()),
            ));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| CapabilityError::call_failed("arxiv", e.to_string()))?;

        let papers = parse_feed(&body);
        log::debug!("arXiv returned {} papers for '{}'", papers.len(), query);
        Ok(papers)
    }
}
