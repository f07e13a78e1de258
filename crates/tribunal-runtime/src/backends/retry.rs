//! Transport-level retry wrapper.
//!
//! Retries live here, below the verification logic: a judge sees one
//! call and one outcome. Only transient errors are retried, and a
//! rate limit's `retry_after` replaces the computed backoff delay.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{BackendError, ModelBackend};

/// Wraps a backend with exponential backoff on transient failures.
pub struct RetryBackend {
    inner: Arc<dyn ModelBackend>,
    max_retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl RetryBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, max_retries: usize) -> Self {
        Self {
            inner,
            max_retries,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

#[async_trait]
impl ModelBackend for RetryBackend {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, BackendError> {
        let inner = &self.inner;
        (|| async move { inner.complete(prompt, temperature).await })
            .retry(self.backoff())
            .when(BackendError::is_transient)
            .adjust(|err: &BackendError, delay: Option<Duration>| {
                // None means the retry budget is spent; keep it that way
                delay.map(|delay| match err {
                    BackendError::RateLimited { retry_after: Some(after) } => *after,
                    _ => delay,
                })
            })
            .notify(|err: &BackendError, delay: Duration| {
                warn!(
                    backend = inner.name(),
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying backend call"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
