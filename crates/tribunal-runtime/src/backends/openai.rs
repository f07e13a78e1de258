//! OpenAI-compatible chat-completions backend.
//!
//! Serves both the hosted API (`openai`) and local inference servers that
//! speak the same protocol (`local`: Ollama, vLLM, llama.cpp server).

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

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable for an optional key in front of a local server.
pub const LOCAL_API_KEY_ENV: &str = "TRIBUNAL_LOCAL_API_KEY";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o";
const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";
const LOCAL_MODEL: &str = "llama3.1";

/// Backend for `/chat/completions` endpoints.
pub struct OpenAiBackend {
    name: &'static str,
    credential: Option<ApiCredential>,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiBackend {
    fn build(
        name: &'static str,
        credential: Option<ApiCredential>,
        options: &JsonValue,
        default_base_url: &str,
        default_model: &str,
    ) -> Result<Self, BackendError> {
        let timeout = duration_option(options, "timeout", DEFAULT_REQUEST_TIMEOUT)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::HttpError(e.to_string()))?;

        Ok(Self {
            name,
            credential,
            base_url: options["base_url"]
                .as_str()
                .unwrap_or(default_base_url)
                .trim_end_matches('/')
                .to_string(),
            model: options["model"].as_str().unwrap_or(default_model).to_string(),
            max_tokens: options["max_tokens"]
                .as_u64()
                .map(|n| n as u32)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout,
            client,
        })
    }

    /// Hosted OpenAI API; requires a key.
    pub fn hosted(options: &JsonValue) -> Result<Self, BackendError> {
        let credential = ApiCredential::from_config_or_env(
            options,
            "api_key",
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;
        Self::build("openai", Some(credential), options, OPENAI_BASE_URL, OPENAI_MODEL)
    }

    /// Local OpenAI-compatible server; the key is optional.
    pub fn local(options: &JsonValue) -> Result<Self, BackendError> {
        let credential =
            ApiCredential::optional(options, "api_key", LOCAL_API_KEY_ENV, "Local API key");
        Self::build("local", credential, options, LOCAL_BASE_URL, LOCAL_MODEL)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
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
impl ModelBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(credential) = &self.credential {
            builder = builder.bearer_auth(credential.expose());
        }

        let response = builder.send().await.map_err(|e| {
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

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                BackendError::MalformedResponse("response contained no message content".into())
            })?;

        debug!(backend = self.name, model = %self.model, chars = text.len(), "Completion received");
        Ok(text)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Factory for the hosted OpenAI API.
pub struct OpenAiBackendFactory;

impl BackendFactory for OpenAiBackendFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn ModelBackend>, BackendError> {
        self.validate_options(options)?;
        Ok(Arc::new(OpenAiBackend::hosted(options)?))
    }

    fn validate_options(&self, options: &JsonValue) -> Result<(), BackendError> {
        if !ApiCredential::is_available(options, "api_key", OPENAI_API_KEY_ENV) {
            return Err(BackendError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in options or {} env",
                OPENAI_API_KEY_ENV
            )));
        }
        validate_base_url(options)
    }

    fn description(&self) -> &'static str {
        "OpenAI chat completions API"
    }
}

/// Factory for local OpenAI-compatible servers.
pub struct LocalBackendFactory;

impl BackendFactory for LocalBackendFactory {
    fn provider_type(&self) -> &'static str {
        "local"
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn ModelBackend>, BackendError> {
        self.validate_options(options)?;
        Ok(Arc::new(OpenAiBackend::local(options)?))
    }

    fn validate_options(&self, options: &JsonValue) -> Result<(), BackendError> {
        validate_base_url(options)
    }

    fn description(&self) -> &'static str {
        "Local OpenAI-compatible inference server"
    }
}
