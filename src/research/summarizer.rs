// SPDX-License-Identifier: MIT

//! Summarizer capability - bounded-length synthesis over arbitrary text
//!
//! Text under the chunk budget is summarized in one model call. Longer text
//! is split on word boundaries, each chunk is summarized on its own, and one
//! final call combines the partial summaries.

use crate::adk::error::CapabilityError;
use crate::adk::model::openai::OpenAIModel;
use crate::adk::model::retry::RetryingModel;
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::research::config::ResearchConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Returned for empty input without calling the model
pub const NOTHING_TO_SUMMARIZE: &str = "No content to summarize.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, max_words: usize) -> Result<String, CapabilityError>;
}

/// Split text into chunks of whole words, each at most `max_chunk_size`
/// characters. A single word longer than the budget becomes its own chunk.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    // joined length plus one trailing separator
    let mut current_length = 0;

    for word in text.split_whitespace() {
        let word_length = word.chars().count() + 1;
        if current_length + word_length > max_chunk_size + 1 && !current.is_empty() {
            chunks.push(current.join(" "));
            current = vec![word];
            current_length = word_length;
        } else {
            current.push(word);
            current_length += word_length;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Summarizer driving an LLM
pub struct LlmSummarizer {
    model: Arc<dyn Model>,
    chunk_size: usize,
    generation: GenerationConfig,
}

impl LlmSummarizer {
    pub fn new(model: Arc<dyn Model>, chunk_size: usize, temperature: f32) -> Self {
        Self {
            model,
            chunk_size: chunk_size.max(1),
            generation: GenerationConfig {
                temperature: Some(temperature),
                ..Default::default()
            },
        }
    }

    async fn complete(&self, prompt: String) -> Result<String, CapabilityError> {
        let response = self
            .model
            .generate_content(&[Content::user(prompt)], Some(&self.generation))
            .await
            .map_err(|e| CapabilityError::call_failed("summarizer", e.to_string()))?;
        Ok(response.text().trim().to_string())
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str, max_words: usize) -> Result<String, CapabilityError> {
        if text.trim().is_empty() {
            return Ok(NOTHING_TO_SUMMARIZE.to_string());
        }

        if text.chars().count() < self.chunk_size {
            return self
                .complete(format!(
                    "Summarize the following text in under {} words:\n\n{}",
                    max_words, text
                ))
                .await;
        }

        let chunks = chunk_text(text, self.chunk_size);
        log::info!("Summarizing {} chunks", chunks.len());

        let mut chunk_summaries = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = format!(
                "Summarize the following text (part {} of {}):\n\n{}",
                i + 1,
                chunks.len(),
                chunk
            );
            match self.complete(prompt).await {
                Ok(summary) => chunk_summaries.push(summary),
                Err(e) => {
                    log::warn!("Chunk {} failed: {}", i + 1, e);
                    chunk_summaries.push(format!(
                        "Error summarizing chunk {}: {}",
                        i + 1,
                        e.message()
                    ));
                }
            }
        }

        let combined = chunk_summaries.join("\n\n");
        self.complete(format!(
            "Create a comprehensive summary in under {} words from these partial summaries:\n\n{}",
            max_words, combined
        ))
        .await
    }
}

/// Summarizer used when no model is configured
pub struct UnavailableSummarizer {
    reason: String,
}

impl UnavailableSummarizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Summarizer for UnavailableSummarizer {
    async fn summarize(&self, _text: &str, _max_words: usize) -> Result<String, CapabilityError> {
        Err(CapabilityError::unavailable("summarizer", &self.reason))
    }
}

/// The summarizer for a configuration: OpenAI behind the retry policy, or
/// an unavailable summarizer when the model cannot be set up
pub fn from_config(config: &ResearchConfig) -> Arc<dyn Summarizer> {
    let model = OpenAIModel::new(
        &config.model_name,
        &config.openai_api_key,
        config.openai_base_url.clone(),
        config.step_timeout(),
    );

    match model {
        Ok(model) => {
            log::info!("Summarizer using model {}", config.model_name);
            let model: Arc<dyn Model> =
                Arc::new(RetryingModel::new(Arc::new(model), config.retry_policy()));
            Arc::new(LlmSummarizer::new(
                model,
                config.chunk_size,
                config.temperature,
            ))
        }
        Err(e) => {
            log::warn!("Summarizer unavailable: {}", e);
            Arc::new(UnavailableSummarizer::new(e.to_string()))
        }
    }
}
