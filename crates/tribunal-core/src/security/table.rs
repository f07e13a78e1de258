//! Security pattern table loading.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_pattern_table;
use crate::types::Severity;

/// Errors that can occur when loading a pattern table.
#[derive(Error, Debug)]
pub enum PatternTableError {
    #[error("Failed to read pattern table: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Pattern table failed schema validation: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Invalid regex for {category} rule '{pattern}': {source}")]
    RegexError {
        category: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One configurable rule as written in a table document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternRule {
    /// Grouping such as "code_execution" or "prompt_injection"
    pub category: String,

    /// Regular expression (Rust `regex` syntax)
    pub pattern: String,

    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PatternRule {
    pub fn new(
        category: impl Into<String>,
        pattern: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            pattern: pattern.into(),
            severity,
            description: Some(description.into()),
        }
    }

    /// Description, falling back to the raw pattern.
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.pattern)
    }
}

/// `version` is accepted by the schema but carries no behavior.
#[derive(Debug, Deserialize)]
struct PatternTableDocument {
    patterns: Vec<PatternRule>,
}

/// A rule together with its compiled regex.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PatternRule,
    pub regex: Regex,
}

/// Where a rule matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub category: String,
    pub severity: Severity,
    pub description: String,

    /// 1-based line of the first match
    pub line: usize,
}

/// An ordered, compiled set of security rules.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rules: Vec<CompiledRule>,
}

impl PatternTable {
    /// Compile a list of rules. Fails on the first invalid regex.
    pub fn compile(rules: Vec<PatternRule>) -> Result<Self, PatternTableError> {
        let rules = rules
            .into_iter()
            .map(|rule| match Regex::new(&rule.pattern) {
                Ok(regex) => Ok(CompiledRule { rule, regex }),
                Err(source) => Err(PatternTableError::RegexError {
                    category: rule.category,
                    pattern: rule.pattern,
                    source,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Parse a pattern table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PatternTableError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a pattern table from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PatternTableError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a pattern table from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PatternTableError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a pattern table from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PatternTableError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load a table file, choosing the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PatternTableError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, PatternTableError> {
        validate_pattern_table(&value).map_err(PatternTableError::SchemaError)?;
        let document: PatternTableDocument = serde_json::from_value(value)?;
        Self::compile(document.patterns)
    }

    /// Append another table's rules after this one's.
    pub fn extend(&mut self, other: PatternTable) {
        self.rules.extend(other.rules);
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule that matches `code`, in table order, once per rule.
    pub fn scan(&self, code: &str) -> Vec<PatternMatch> {
        self.rules
            .iter()
            .filter_map(|compiled| {
                compiled.regex.find(code).map(|m| PatternMatch {
                    category: compiled.rule.category.clone(),
                    severity: compiled.rule.severity,
                    description: compiled.rule.label().to_string(),
                    line: code[..m.start()].matches('\n').count() + 1,
                })
            })
            .collect()
    }
}
