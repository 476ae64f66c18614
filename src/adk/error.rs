// SPDX-License-Identifier: MIT

//! Typed error handling for research-orchestrator
//!
//! Errors are split by layer: `ResearchError` for anything that can stop the
//! process (configuration, startup, I/O), `WorkflowError` for graph
//! construction, `ModelError` for LLM clients, `CapabilityError` for the
//! degradable calls a workflow step makes, and `StoreError` for persistence.

use thiserror::Error;

/// Top-level error type for research-orchestrator
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Configuration errors (missing env vars, invalid config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow graph errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while building or validating the workflow graph.
///
/// These are the only fatal workflow errors: once a graph validates, a run
/// always reaches the terminal state.
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    /// A step has no outgoing transition
    #[error("Step '{0}' has no outgoing transition")]
    DeadEnd(String),

    /// A step cannot be reached from the entry step
    #[error("Step '{0}' is unreachable from the entry step")]
    Unreachable(String),

    /// The terminal state cannot be reached from a step
    #[error("Step '{0}' can never reach the terminal state")]
    NoTerminalPath(String),

    /// A step has no implementation bound to it
    #[error("No node registered for step '{0}'")]
    MissingNode(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Non-success status from the provider
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Transport failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Closed failure taxonomy for capability calls made by workflow steps.
///
/// Every variant is degradable: the calling step records it in the state and
/// the run continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    /// The backend is not configured or not reachable at all
    #[error("{capability} unavailable: {message}")]
    Unavailable { capability: String, message: String },

    /// The backend was called and failed (network, LLM, timeout)
    #[error("{capability} call failed: {message}")]
    CallFailed { capability: String, message: String },

    /// The request could not be made with the given input
    #[error("{capability} rejected input: {message}")]
    InvalidInput { capability: String, message: String },
}

impl CapabilityError {
    pub fn unavailable(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn call_failed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallFailed {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// The underlying message without the capability prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Unavailable { message, .. }
            | Self::CallFailed { message, .. }
            | Self::InvalidInput { message, .. } => message,
        }
    }
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl ResearchError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
