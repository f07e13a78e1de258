//! Target language identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the static analyzer knows how to check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Java,
    C,
    Cpp,
    CSharp,
    Go,
    Kotlin,
    Swift,
    Json,
    Yaml,
    Other(String),
}

impl Language {
    /// Parse a caller-supplied language name, accepting common aliases.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "rust" | "rs" => Language::Rust,
            "python" | "py" | "python3" => Language::Python,
            "javascript" | "js" | "node" | "mjs" => Language::JavaScript,
            "typescript" | "ts" | "tsx" => Language::TypeScript,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "c++" | "cxx" | "cc" | "hpp" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "go" | "golang" => Language::Go,
            "kotlin" | "kt" => Language::Kotlin,
            "swift" => Language::Swift,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            other => Language::Other(other.to_string()),
        }
    }

    /// Whether blocks are delimited with `{` / `}`.
    pub fn is_brace_delimited(&self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::JavaScript
                | Language::TypeScript
                | Language::Java
                | Language::C
                | Language::Cpp
                | Language::CSharp
                | Language::Go
                | Language::Kotlin
                | Language::Swift
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Other(name) => name,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
