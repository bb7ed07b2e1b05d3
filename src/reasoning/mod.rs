//! Reasoning backend contract and retry policy
//!
//! A [`ReasoningClient`] performs exactly one attempt per `send`. Retrying is
//! layered on top by [`RetryingClient`], so tests can count raw attempts.

mod client;
pub mod parse;

pub use client::HttpReasoningClient;

use crate::config::LlmSettings;
use crate::error::ReasoningError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Backoff multiplier between consecutive attempts
const BACKOFF_MULTIPLIER: u32 = 2;

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// One request: system prompt plus user payload, raw response text back.
    async fn send(&self, system: &str, user: &str) -> Result<String, ReasoningError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Wraps a client with bounded exponential backoff for transient failures.
/// Non-transient errors are returned after the first attempt.
pub struct RetryingClient {
    inner: Arc<dyn ReasoningClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ReasoningClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ReasoningClient for RetryingClient {
    async fn send(&self, system: &str, user: &str) -> Result<String, ReasoningError> {
        let mut retry = 0;
        loop {
            match self.inner.send(system, user).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.backoff(retry);
                    tracing::warn!(
                        attempt = retry,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "reasoning request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
