// SPDX-License-Identifier: MIT

//! Retrying model wrapper with exponential backoff

use super::{Content, GenerationConfig, Model};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Longest wait between two attempts, whatever the backoff
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How often and how patiently a failed model call is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait after the first failure
    pub initial_delay: Duration,
    /// Multiplier applied to the wait after each failure
    pub backoff: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff: 2,
        }
    }
}

impl RetryPolicy {
    /// The wait that follows `wait`, capped at [`MAX_RETRY_DELAY`]
    pub fn next_delay(&self, wait: Duration) -> Duration {
        wait.checked_mul(self.backoff.max(1))
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

/// Wraps another model and retries failed calls according to a policy.
///
/// Only the last error is returned once attempts are exhausted.
pub struct RetryingModel {
    inner: Arc<dyn Model>,
    policy: RetryPolicy,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn Model>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Model for RetryingModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut wait = self.policy.initial_delay.min(MAX_RETRY_DELAY);
        let mut attempt = 1;

        loop {
            match self.inner.generate_content(history, config).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "Model call failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    wait = self.policy.next_delay(wait);
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("Model call failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Part;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails a fixed number of times, then answers
    struct FlakyModel {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyModel {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Model for FlakyModel {
        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ModelError::InvalidResponse(format!("failure {}", call)))
            } else {
                Ok(Content {
                    role: "model".to_string(),
                    parts: vec![Part::Text("ok".to_string())],
                })
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            backoff: 2,
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let inner = Arc::new(FlakyModel::new(2));
        let model = RetryingModel::new(inner.clone(), fast_policy(3));

        let content = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap();

        assert_eq!(content.text(), "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyModel::new(10));
        let model = RetryingModel::new(inner.clone(), fast_policy(3));

        let err = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failure 2"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_calls_once() {
        let inner = Arc::new(FlakyModel::new(1));
        let model = RetryingModel::new(inner.clone(), fast_policy(1));

        assert!(model
            .generate_content(&[Content::user("hi")], None)
            .await
            .is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_next_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(policy.next_delay(Duration::from_secs(45)), MAX_RETRY_DELAY);

        let huge = RetryPolicy {
            backoff: u32::MAX,
            ..policy
        };
        assert_eq!(huge.next_delay(Duration::MAX), MAX_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_retries_with_large_backoff_do_not_overflow() {
        let inner = Arc::new(FlakyModel::new(100));
        let policy = RetryPolicy {
            max_attempts: 50,
            initial_delay: Duration::from_secs(2),
            backoff: u32::MAX,
        };
        let model = RetryingModel::new(inner.clone(), policy);

        let err = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failure 49"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 50);
    }
}
