//! Request execution with retry, backoff and cancellation.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::TransferConfig;
use crate::utils::{PipelineError, PipelineResult};

/// Header carrying the per-run correlation id on every request.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Longest response body excerpt carried into error messages.
const BODY_SNIPPET_LIMIT: usize = 256;

/// Retry budget applied to each individual request.
///
/// A request is attempted once plus `max_retries` times, with the delay
/// doubling after every failed attempt. Only retryable failures (transport
/// errors, timeouts, 5xx, 429) consume the budget; anything else fails
/// immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self { max_retries: config.max_retries, retry_delay: config.retry_delay() }
    }

    /// Delay before the retry following failed attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs one logical request to completion.
    ///
    /// `build` must produce a fresh [`RequestBuilder`] per attempt; bodies
    /// like multipart forms cannot be replayed. Cancellation is honored
    /// before every attempt, while a request is in flight and during
    /// backoff sleeps.
    pub async fn execute<F>(
        &self,
        op: &str,
        cancel: &CancellationToken,
        mut build: F,
    ) -> PipelineResult<Response>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                result = build().send() => result,
            };

            let err = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => classify_response(response).await,
                Err(transport) => classify_transport(&transport),
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                op,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "request failed, retrying: {err}"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

async fn classify_response(response: Response) -> PipelineError {
    let status = response.status().as_u16();
    classify_status(status, body_snippet(response).await)
}

/// Maps a non-success HTTP status onto the error taxonomy.
fn classify_status(status: u16, message: String) -> PipelineError {
    match status {
        429 => PipelineError::RateLimited,
        404 => PipelineError::NotFound(message),
        500..=599 => PipelineError::Server { status, message },
        _ => PipelineError::Rejected { status, message },
    }
}

fn classify_transport(err: &reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::timeout(err.to_string())
    } else {
        PipelineError::network(err.to_string())
    }
}

/// Pulls a bounded excerpt of the response body for error messages.
async fn body_snippet(response: Response) -> String {
    match response.text().await {
        Ok(body) if body.trim().is_empty() => "(empty body)".to_string(),
        Ok(body) => {
            let mut snippet: String = body.chars().take(BODY_SNIPPET_LIMIT).collect();
            if snippet.len() < body.len() {
                snippet.push_str("...");
            }
            snippet
        }
        Err(_) => "(unreadable body)".to_string(),
    }
}
