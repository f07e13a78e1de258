//! Secure credential handling for model backends.
//!
//! Credentials are read only by backend factories, from the backend's
//! options with an environment-variable fallback, and are wrapped in a
//! [`SecretString`] immediately.
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(&options, "api_key", "ANTHROPIC_API_KEY", "Anthropic API key")?;
//! request.header("x-api-key", cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::BackendError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Backend options in the pipeline configuration
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// `Debug` and `Display` show `[REDACTED]`; the value is only reachable
/// through [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from `config[config_key]`, falling back to `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, BackendError> {
        if let Some(value) = config[config_key].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Ok(value) = std::env::var(env_var) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(BackendError::NotConfigured(format!(
            "{} required: set '{}' in backend options or {} environment variable",
            name, config_key, env_var
        )))
    }

    /// Like [`from_config_or_env`](Self::from_config_or_env), but absence is not an error.
    pub fn optional(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Option<Self> {
        Self::from_config_or_env(config, config_key, env_var, name).ok()
    }

    /// Check if a credential is available without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config[config_key].as_str().is_some() || std::env::var(env_var).is_ok()
    }

    /// Expose the value at the point of use (an HTTP header).
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Config, "Test API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));

        let display = format!("{}", cred);
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert!(display.contains("Test API key from config"));

        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_config_takes_precedence_over_env() {
        let config = serde_json::json!({ "api_key": "config-key" });
        std::env::set_var("TRIBUNAL_TEST_KEY_PRIORITY", "env-key");

        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TRIBUNAL_TEST_KEY_PRIORITY",
            "Test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);

        std::env::remove_var("TRIBUNAL_TEST_KEY_PRIORITY");
    }

    #[test]
    fn test_env_fallback() {
        std::env::set_var("TRIBUNAL_TEST_KEY_FALLBACK", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "TRIBUNAL_TEST_KEY_FALLBACK",
            "Test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("TRIBUNAL_TEST_KEY_FALLBACK");
    }

    #[test]
    fn test_missing_credential() {
        let config = serde_json::json!({});
        let err = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TRIBUNAL_NONEXISTENT_VAR_12345",
            "Test key",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Test key"));
        assert!(message.contains("TRIBUNAL_NONEXISTENT_VAR_12345"));

        assert!(ApiCredential::optional(&config, "api_key", "TRIBUNAL_NONEXISTENT_VAR_12345", "x").is_none());
        assert!(!ApiCredential::is_available(&config, "api_key", "TRIBUNAL_NONEXISTENT_VAR_12345"));
    }
}
