//! Pipeline configuration.
//!
//! Built once at startup (usually from YAML) and passed by reference into
//! the pipeline. Nothing in the evaluation path reads the environment;
//! only backend factories resolve credentials, and only at build time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use tribunal_core::{PatternTable, PatternTableError, DEFAULT_JUDGE_COUNT};

/// A pool with this many approvals or fewer is a terminal rejection.
pub const MAJORITY_REJECT_AT_OR_BELOW: usize = 1;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid pattern table: {0}")]
    PatternTable(#[from] PatternTableError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Approvals at or below this count end the run as a majority rejection
    pub majority_reject_at_or_below: usize,

    /// Minimum aggregate confidence for an approval; 0 disables the gate
    pub min_confidence: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            majority_reject_at_or_below: MAJORITY_REJECT_AT_OR_BELOW,
            min_confidence: 0,
        }
    }
}

/// Per-stage and overall deadlines, written as `"30s"`, `"2m"`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "duration_human")]
    pub judge: Duration,

    #[serde(with = "duration_human")]
    pub deep: Duration,

    #[serde(with = "duration_human")]
    pub arbiter: Duration,

    /// Overall deadline for one run
    #[serde(with = "duration_human")]
    pub pipeline: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            judge: Duration::from_secs(30),
            deep: Duration::from_secs(60),
            arbiter: Duration::from_secs(60),
            pipeline: Duration::from_secs(180),
        }
    }
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Sampling temperatures per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperatures {
    pub judge: f32,
    pub deep: f32,
    pub arbiter: f32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            judge: 0.2,
            deep: 0.1,
            arbiter: 0.0,
        }
    }
}

/// One named backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Registry provider name ("anthropic", "openai", "local")
    pub provider: String,

    /// Transport-level retries for transient failures
    #[serde(default)]
    pub retries: usize,

    /// Provider-specific options (model, base_url, api_key, ...)
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Where the security gate's rules come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Extra YAML or JSON pattern table
    pub pattern_table: Option<PathBuf>,

    /// Keep the built-in rules alongside the extra table
    pub include_builtin: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            pattern_table: None,
            include_builtin: true,
        }
    }
}

impl SecurityConfig {
    /// Load the configured rules. Happens once; tables are never reloaded
    /// while a pipeline exists.
    pub fn load_table(&self) -> Result<PatternTable, ConfigError> {
        let mut table = if self.include_builtin {
            tribunal_core::security::builtin_table()
        } else {
            PatternTable::default()
        };

        if let Some(path) = &self.pattern_table {
            table.extend(PatternTable::from_file(path)?);
        }

        if table.is_empty() {
            return Err(ConfigError::Invalid(
                "security gate has no rules: set a pattern_table or include_builtin".to_string(),
            ));
        }
        Ok(table)
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Judges per run when the request does not override it
    pub judge_count: usize,

    /// Default backend identifiers; judge i uses `judge_backends[i % len]`
    pub judge_backends: Vec<String>,

    /// Defaults to the first judge backend
    pub deep_backend: Option<String>,

    /// Defaults to the first judge backend
    pub arbiter_backend: Option<String>,

    pub thresholds: Thresholds,
    pub timeouts: Timeouts,
    pub temperatures: Temperatures,

    /// Re-examine disputed pools before the arbiter
    pub deep_verification: bool,

    /// Backend definitions keyed by identifier
    pub backends: BTreeMap<String, BackendSpec>,

    pub security: SecurityConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            judge_count: DEFAULT_JUDGE_COUNT,
            judge_backends: Vec::new(),
            deep_backend: None,
            arbiter_backend: None,
            thresholds: Thresholds::default(),
            timeouts: Timeouts::default(),
            temperatures: Temperatures::default(),
            deep_verification: true,
            backends: BTreeMap::new(),
            security: SecurityConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check internal consistency.
    ///
    /// Backend identifiers are only checked against `backends` here;
    /// whether their providers exist is decided by the registry when the
    /// pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.judge_backends.is_empty() {
            return Err(ConfigError::Invalid(
                "judge_backends must name at least one backend".to_string(),
            ));
        }

        self.check_judge_count(self.judge_count)
            .map_err(ConfigError::Invalid)?;

        let referenced = self
            .judge_backends
            .iter()
            .chain(self.deep_backend.iter())
            .chain(self.arbiter_backend.iter());
        for id in referenced {
            if !self.backends.contains_key(id) {
                return Err(ConfigError::Invalid(format!(
                    "backend '{}' is referenced but not defined",
                    id
                )));
            }
        }

        if self.thresholds.min_confidence > 100 {
            return Err(ConfigError::Invalid(
                "thresholds.min_confidence must be between 0 and 100".to_string(),
            ));
        }

        for (name, timeout) in [
            ("judge", self.timeouts.judge),
            ("deep", self.timeouts.deep),
            ("arbiter", self.timeouts.arbiter),
            ("pipeline", self.timeouts.pipeline),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "timeouts.{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }

    /// A pool must be able to clear the majority-reject threshold.
    pub fn check_judge_count(&self, judge_count: usize) -> Result<(), String> {
        if judge_count == 0 {
            return Err("judge_count must be at least 1".to_string());
        }
        if judge_count <= self.thresholds.majority_reject_at_or_below {
            return Err(format!(
                "judge_count {} cannot exceed the majority-reject threshold of {} approvals",
                judge_count, self.thresholds.majority_reject_at_or_below
            ));
        }
        Ok(())
    }

    /// Backend used by the deep verifier.
    pub fn deep_backend_id(&self) -> Option<&str> {
        self.deep_backend
            .as_deref()
            .or_else(|| self.judge_backends.first().map(String::as_str))
    }

    /// Backend used by the arbiter.
    pub fn arbiter_backend_id(&self) -> Option<&str> {
        self.arbiter_backend
            .as_deref()
            .or_else(|| self.judge_backends.first().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
judge_count: 4
judge_backends: [claude, gpt]
arbiter_backend: claude
thresholds:
  min_confidence: 70
timeouts:
  judge: 45s
  pipeline: 5m
backends:
  claude:
    provider: anthropic
    retries: 2
    options:
      model: claude-sonnet-4-5
  gpt:
    provider: openai
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = PipelineConfig::from_yaml(CONFIG).unwrap();

        assert_eq!(config.judge_count, 4);
        assert_eq!(config.judge_backends, vec!["claude", "gpt"]);
        assert_eq!(config.thresholds.min_confidence, 70);
        assert_eq!(config.thresholds.majority_reject_at_or_below, MAJORITY_REJECT_AT_OR_BELOW);
        assert_eq!(config.timeouts.judge, Duration::from_secs(45));
        assert_eq!(config.timeouts.deep, Duration::from_secs(60));
        assert_eq!(config.timeouts.pipeline, Duration::from_secs(300));
        assert_eq!(config.temperatures.judge, 0.2);
        assert!(config.deep_verification);
        assert!(config.security.include_builtin);

        assert_eq!(config.backends["claude"].retries, 2);
        assert_eq!(config.backends["claude"].options["model"], "claude-sonnet-4-5");
        assert_eq!(config.backends["gpt"].retries, 0);
    }

    #[test]
    fn test_backend_fallbacks() {
        let config = PipelineConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.arbiter_backend_id(), Some("claude"));
        assert_eq!(config.deep_backend_id(), Some("claude"));
    }

    #[test]
    fn test_undefined_backend_rejected() {
        let yaml = "judge_backends: [ghost]\n";
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("'ghost'"));
    }

    #[test]
    fn test_no_judge_backends_rejected() {
        let err = PipelineConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("judge_backends"));
    }

    #[test]
    fn test_judge_count_must_clear_threshold() {
        let config = PipelineConfig::default();
        assert!(config.check_judge_count(0).is_err());
        assert!(config.check_judge_count(1).is_err());
        assert!(config.check_judge_count(2).is_ok());
    }

    #[test]
    fn test_bad_duration_rejected() {
        let yaml = "timeouts:\n  judge: soon\n";
        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = r#"
judge_backends: [a]
timeouts:
  pipeline: 0s
backends:
  a:
    provider: local
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("timeouts.pipeline"));
    }

    #[test]
    fn test_security_table_requires_rules() {
        let security = SecurityConfig {
            pattern_table: None,
            include_builtin: false,
        };
        assert!(security.load_table().is_err());
        assert!(!SecurityConfig::default().load_table().unwrap().is_empty());
    }

    #[test]
    fn test_timeouts_serialize_human_readable() {
        let yaml = serde_yaml::to_string(&Timeouts::default()).unwrap();
        assert!(yaml.contains("judge: 30s"));
        assert!(yaml.contains("pipeline: 3m"));
    }
}
