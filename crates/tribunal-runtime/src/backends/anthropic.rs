//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    duration_option, registry::BackendFactory, secrets::ApiCredential, validate_base_url,
    BackendError, ModelBackend, DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT,
};

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";

/// Backend for Anthropic's `/v1/messages` endpoint.
pub struct AnthropicBackend {
    credential: ApiCredential,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicBackend {
    /// Build from backend options, falling back to `ANTHROPIC_API_KEY`.
    ///
    /// Recognized options: `api_key`, `base_url`, `model`, `max_tokens`,
    /// `timeout` (humantime, e.g. `"90s"`).
    pub fn from_options(options: &JsonValue) -> Result<Self, BackendError> {
        let credential = ApiCredential::from_config_or_env(
            options,
            "api_key",
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;
        let timeout = duration_option(options, "timeout", DEFAULT_REQUEST_TIMEOUT)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::HttpError(e.to_string()))?;

        Ok(Self {
            credential,
            base_url: options["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: options["model"].as_str().unwrap_or(DEFAULT_MODEL).to_string(),
            max_tokens: options["max_tokens"]
                .as_u64()
                .map(|n| n as u32)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, BackendError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        // Only expose the credential at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.timeout)
                } else {
                    BackendError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BackendError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BackendError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<ErrorEnvelope>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
            };
            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(BackendError::MalformedResponse(
                "response contained no text blocks".to_string(),
            ));
        }

        debug!(backend = "anthropic", model = %self.model, chars = text.len(), "Completion received");
        Ok(text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for [`AnthropicBackend`].
///
/// ```yaml
/// provider: anthropic
/// options:
///   model: claude-sonnet-4-5   # optional
///   api_key: sk-ant-...        # optional, falls back to ANTHROPIC_API_KEY
/// ```
pub struct AnthropicBackendFactory;

impl BackendFactory for AnthropicBackendFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn ModelBackend>, BackendError> {
        self.validate_options(options)?;
        Ok(Arc::new(AnthropicBackend::from_options(options)?))
    }

    fn validate_options(&self, options: &JsonValue) -> Result<(), BackendError> {
        if !ApiCredential::is_available(options, "api_key", ANTHROPIC_API_KEY_ENV) {
            return Err(BackendError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in options or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }
        validate_base_url(options)
    }

    fn description(&self) -> &'static str {
        "Anthropic Messages API"
    }
}
