// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional YAML file, and environment variables (after `.env` is loaded
//! by the binary).

use crate::adk::error::ResearchError;
use crate::adk::model::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Full application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// sqlx connection string for the session store
    pub database_url: String,
    /// OpenAI API key; an empty key leaves the summarizer unavailable
    pub openai_api_key: String,
    /// Override for OpenAI-compatible endpoints
    pub openai_base_url: Option<String>,
    pub model_name: String,
    pub temperature: f32,
    /// Brave Search key for the `web` source
    pub brave_api_key: Option<String>,
    pub port: u16,
    /// Sources queried by the fetch step
    pub sources: Vec<String>,
    /// Results requested from each source per query
    pub max_results_per_source: u32,
    /// Wikipedia language edition, e.g. `en` or `de`
    pub wikipedia_lang: String,
    pub summary_max_words: usize,
    /// Character budget per chunk, also the single-call threshold
    pub chunk_size: usize,
    /// Upper bound on summarize executions per run
    pub max_summarize_attempts: u32,
    /// Upper bound on executed steps per run
    pub max_steps: u32,
    pub step_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub max_query_chars: usize,
    /// Phrases that make the critic reject a summary
    pub rejected_phrases: Vec<String>,
    pub llm_retries: u32,
    pub llm_retry_delay_ms: u64,
    pub llm_retry_backoff: u32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://research.db?mode=rwc".to_string(),
            openai_api_key: String::new(),
            openai_base_url: None,
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            brave_api_key: None,
            port: 8000,
            sources: vec!["arxiv".to_string(), "wikipedia".to_string()],
            max_results_per_source: 3,
            wikipedia_lang: "en".to_string(),
            summary_max_words: 200,
            chunk_size: 8000,
            max_summarize_attempts: 3,
            max_steps: 32,
            step_timeout_secs: 120,
            run_timeout_secs: 300,
            max_query_chars: 1000,
            rejected_phrases: vec!["lorem ipsum".to_string()],
            llm_retries: 3,
            llm_retry_delay_ms: 2000,
            llm_retry_backoff: 2,
        }
    }
}

impl ResearchConfig {
    /// Load defaults, then the YAML file if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ResearchError> {
        let mut config = match path {
            Some(p) => Self::from_yaml(&fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from YAML, filling gaps with defaults
    pub fn from_yaml(content: &str) -> Result<Self, ResearchError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ResearchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = v;
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.openai_base_url = Some(v);
        }
        if let Some(v) = lookup("MODEL_NAME") {
            self.model_name = v;
        }
        if let Some(v) = lookup("BRAVE_API_KEY") {
            self.brave_api_key = Some(v);
        }
        if let Some(v) = lookup("PORT") {
            self.port = v
                .parse()
                .map_err(|_| ResearchError::config(format!("PORT is not a valid port: {}", v)))?;
        }
        if let Some(v) = lookup("RESEARCH_SOURCES") {
            self.sources = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("WIKIPEDIA_LANG") {
            self.wikipedia_lang = v;
        }
        if let Some(v) = lookup("MAX_SUMMARIZE_ATTEMPTS") {
            self.max_summarize_attempts = v.parse().map_err(|_| {
                ResearchError::config(format!("MAX_SUMMARIZE_ATTEMPTS is not a number: {}", v))
            })?;
        }
        Ok(())
    }

    /// Reject values the workflow cannot run with
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.sources.is_empty() {
            return Err(ResearchError::config("at least one source must be configured"));
        }
        if self.chunk_size == 0 {
            return Err(ResearchError::config("chunk_size must be positive"));
        }
        if self.max_summarize_attempts == 0 {
            return Err(ResearchError::config(
                "max_summarize_attempts must be at least 1",
            ));
        }
        // fetch, then summarize and critic per attempt, then persist
        let full_run = 2 * self.max_summarize_attempts + 2;
        if self.max_steps < full_run {
            return Err(ResearchError::config(format!(
                "max_steps must be at least {} to allow {} summarize attempts",
                full_run, self.max_summarize_attempts
            )));
        }
        if self.run_timeout_secs == 0 {
            return Err(ResearchError::config("run_timeout_secs must be positive"));
        }
        if self.max_results_per_source == 0 {
            return Err(ResearchError::config(
                "max_results_per_source must be at least 1",
            ));
        }
        if self.wikipedia_lang.trim().is_empty() {
            return Err(ResearchError::config("wikipedia_lang must not be empty"));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.llm_retries.max(1),
            initial_delay: Duration::from_millis(self.llm_retry_delay_ms),
            backoff: self.llm_retry_backoff.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::default();
        assert_eq!(config.sources, vec!["arxiv", "wikipedia"]);
        assert_eq!(config.chunk_size, 8000);
        assert_eq!(config.summary_max_words, 200);
        assert_eq!(config.max_query_chars, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
            model_name: gpt-4o
            max_summarize_attempts: 5
            sources: [arxiv, wikipedia, web]
        "#;
        let config = ResearchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.model_name, "gpt-4o");
        assert_eq!(config.max_summarize_attempts, 5);
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "9001"),
            ("RESEARCH_SOURCES", "web, arxiv"),
        ]
        .into_iter()
        .collect();

        let mut config = ResearchConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.port, 9001);
        assert_eq!(config.sources, vec!["web", "arxiv"]);
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let mut config = ResearchConfig::default();
        let err = config
            .apply_env(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = ResearchConfig {
            max_summarize_attempts: 0,
            ..ResearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_step_cap_below_retry_bound() {
        let config = ResearchConfig {
            max_summarize_attempts: 10,
            max_steps: 21,
            ..ResearchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 22"));

        let config = ResearchConfig {
            max_steps: 22,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_run_timeout() {
        let config = ResearchConfig {
            run_timeout_secs: 0,
            ..ResearchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("run_timeout_secs"));
    }

    #[test]
    fn test_source_settings_from_yaml_and_env() {
        let mut config = ResearchConfig::from_yaml("max_results_per_source: 5").unwrap();
        config
            .apply_env(|k| (k == "WIKIPEDIA_LANG").then(|| "de".to_string()))
            .unwrap();
        assert_eq!(config.max_results_per_source, 5);
        assert_eq!(config.wikipedia_lang, "de");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = ResearchConfig {
            llm_retries: 0,
            ..ResearchConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_millis(2000));
    }
}
