//! Model backend abstractions.
//!
//! A [`ModelBackend`] turns a prompt into text. Judges, the deep verifier
//! and the arbiter only ever see this trait; concrete HTTP backends are
//! chosen once at configuration time through the [`BackendRegistry`].
//!
//! ## Security
//!
//! All HTTP backends hold their keys in an [`ApiCredential`], which never
//! prints its value through `Debug` or `Display`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod registry;
mod retry;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use registry::{BackendFactory, BackendRegistry};
pub use retry::RetryBackend;
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicBackend, AnthropicBackendFactory};

#[cfg(feature = "openai")]
pub use openai::{LocalBackendFactory, OpenAiBackend, OpenAiBackendFactory};

/// Default completion budget for backends that require one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from model backends.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::HttpError(_)
            | BackendError::RateLimited { .. }
            | BackendError::Timeout(_) => true,
            BackendError::ApiError { status, .. } => *status >= 500,
            BackendError::MalformedResponse(_)
            | BackendError::AuthError
            | BackendError::NotConfigured(_) => false,
        }
    }
}

/// Text completion capability.
///
/// Implementations must be safe to call concurrently from several judges;
/// a call never mutates state visible to other callers.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Complete `prompt` and return the raw response text.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, BackendError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Read an optional humantime duration such as `"90s"` from backend options.
pub(crate) fn duration_option(
    options: &serde_json::Value,
    key: &str,
    default: Duration,
) -> Result<Duration, BackendError> {
    match options[key].as_str() {
        Some(text) => humantime::parse_duration(text)
            .map_err(|e| BackendError::NotConfigured(format!("invalid '{}': {}", key, e))),
        None => Ok(default),
    }
}

/// Reject base URLs that are not HTTP(S).
pub(crate) fn validate_base_url(options: &serde_json::Value) -> Result<(), BackendError> {
    if let Some(url) = options["base_url"].as_str() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(BackendError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
