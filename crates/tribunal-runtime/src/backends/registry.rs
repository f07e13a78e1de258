//! Backend factory registry.
//!
//! Maps provider names ("anthropic", "openai", "local") to factories that
//! build backends from their JSON options. Resolution happens once, when
//! the pipeline is constructed, never per call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{BackendError, ModelBackend};

/// Factory for creating backends from configuration.
pub trait BackendFactory: Send + Sync {
    /// Provider name this factory answers to.
    fn provider_type(&self) -> &'static str;

    /// Build a backend from provider-specific options.
    fn create(&self, options: &JsonValue) -> Result<Arc<dyn ModelBackend>, BackendError>;

    /// Check options without building anything.
    fn validate_options(&self, options: &JsonValue) -> Result<(), BackendError>;

    fn description(&self) -> &'static str {
        "Model backend"
    }
}

/// Registry of available backend factories.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same provider name.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Build a backend for `provider_type` from its options.
    pub fn create(
        &self,
        provider_type: &str,
        options: &JsonValue,
    ) -> Result<Arc<dyn ModelBackend>, BackendError> {
        self.factory(provider_type)?.create(options)
    }

    pub fn validate(&self, provider_type: &str, options: &JsonValue) -> Result<(), BackendError> {
        self.factory(provider_type)?.validate_options(options)
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn BackendFactory>, BackendError> {
        self.factories.get(provider_type).ok_or_else(|| {
            BackendError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registry with every built-in backend enabled by crate features.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicBackendFactory));

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiBackendFactory));

        #[cfg(feature = "local")]
        registry.register(Arc::new(super::LocalBackendFactory));

        registry
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
