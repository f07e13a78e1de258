//! Per-language structural checkers.
//!
//! Each checker answers one question: does this artifact have the shape
//! of a well-formed program in its language? Errors are syntax-level and
//! fatal; warnings are style-level and never block.

use lazy_static::lazy_static;
use regex::Regex;

use super::delimiters::{scan_delimiters, LexSyntax};
use super::language::Language;

lazy_static! {
    static ref RUST_DECL: Regex = Regex::new(
        r#"(?m)^\s*(?:#!?\[.*\]\s*)*(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|const|unsafe|extern\s+"[^"]*")\s+)*(?:(?:fn|struct|enum|trait|impl|mod|use|const|static|type)\b|macro_rules!)"#
    ).unwrap();

    static ref JS_DECL: Regex = Regex::new(
        r"(?m)^\s*(?:export\s+(?:default\s+)?)?(?:async\s+)?(?:function\*?|class|const|let|var|import|interface|type|enum|declare|module\.exports|exports\.)"
    ).unwrap();

    static ref JVM_DECL: Regex = Regex::new(
        r"(?m)^\s*(?:@\w+(?:\([^)]*\))?\s*)*(?:(?:public|private|protected|internal|static|final|abstract|sealed|open|data|override|partial|fileprivate)\s+)*(?:class|interface|enum|record|struct|object|fun|func|void|package|import|using|namespace|protocol|extension|let|var)\b"
    ).unwrap();

    static ref C_DECL: Regex = Regex::new(
        r"(?m)^\s*(?:#\s*(?:include|define|pragma)|typedef\b|struct\b|class\b|namespace\b|template\s*<|enum\b|union\b|(?:(?:static|inline|extern|const|unsigned|signed)\s+)*[A-Za-z_][\w:<>,\*&\s]*?[\s\*&]+[A-Za-z_]\w*\s*\()"
    ).unwrap();

    static ref GO_DECL: Regex = Regex::new(
        r"(?m)^\s*(?:package|import|func|type|var|const)\b"
    ).unwrap();

    static ref PYTHON_DECL: Regex = Regex::new(
        r"(?m)^(?:async\s+def\s|def\s|class\s|import\s|from\s|@|[A-Za-z_]\w*\s*(?::[^=]+)?=)"
    ).unwrap();

    static ref PYTHON_BLOCK_HEADER: Regex = Regex::new(
        r"^(?:async\s+)?(?:def|class|if|elif|else|for|while|try|except|finally|with|match|case)\b"
    ).unwrap();
}

/// Outcome of a single checker run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// A structural checker for one language family.
pub trait LanguageChecker: Send + Sync {
    /// Family name used in log fields.
    fn family(&self) -> &'static str;

    /// Run every structural check on `code`.
    fn check(&self, code: &str) -> CheckReport;
}

/// Build the checker for a language, if one exists.
pub fn checker_for(language: &Language) -> Option<Box<dyn LanguageChecker>> {
    let checker: Box<dyn LanguageChecker> = match language {
        Language::Rust => Box::new(BraceChecker::new("rust", LexSyntax::RUST, &RUST_DECL)),
        Language::JavaScript | Language::TypeScript => {
            Box::new(BraceChecker::new("ecmascript", LexSyntax::JAVASCRIPT, &JS_DECL))
        }
        Language::Java | Language::Kotlin | Language::Swift => {
            Box::new(BraceChecker::new("jvm-like", LexSyntax::JVM, &JVM_DECL))
        }
        Language::CSharp => Box::new(BraceChecker::new("csharp", LexSyntax::CSHARP, &JVM_DECL)),
        Language::C => Box::new(BraceChecker::new("c-family", LexSyntax::C_LIKE, &C_DECL)),
        Language::Cpp => Box::new(BraceChecker::new("c-family", LexSyntax::CPP, &C_DECL)),
        Language::Go => Box::new(BraceChecker::new("go", LexSyntax::GO, &GO_DECL)),
        Language::Python => Box::new(PythonChecker),
        Language::Json => Box::new(JsonChecker),
        Language::Yaml => Box::new(YamlChecker),
        Language::Other(_) => return None,
    };
    Some(checker)
}

/// Checker for brace-delimited languages.
pub struct BraceChecker {
    family: &'static str,
    syntax: LexSyntax,
    declaration: &'static Regex,
}

impl BraceChecker {
    pub fn new(family: &'static str, syntax: LexSyntax, declaration: &'static Regex) -> Self {
        Self {
            family,
            syntax,
            declaration,
        }
    }
}

impl LanguageChecker for BraceChecker {
    fn family(&self) -> &'static str {
        self.family
    }

    fn check(&self, code: &str) -> CheckReport {
        let mut report = CheckReport::default();

        if let Err(e) = scan_delimiters(code, &self.syntax) {
            report.errors.push(format!("syntax: {}", e));
        }

        if !self.declaration.is_match(code) {
            report
                .warnings
                .push("no recognizable top-level declaration".to_string());
        }

        report
    }
}

/// Checker for Python's indentation-delimited blocks.
pub struct PythonChecker;

impl PythonChecker {
    /// Indentation width, counting a tab as 8 columns like CPython does.
    fn indent_of(line: &str) -> usize {
        line.chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .map(|c| if c == '\t' { 8 } else { 1 })
            .sum()
    }

    /// Lines that carry code, with their 1-based numbers.
    ///
    /// Blank lines, comment-only lines and the bodies of triple-quoted
    /// strings are dropped so that indentation checks see real statements.
    fn code_lines(code: &str) -> Vec<(usize, &str)> {
        let mut lines = Vec::new();
        let mut in_triple: Option<&str> = None;

        for (idx, line) in code.lines().enumerate() {
            let trimmed = line.trim();

            if let Some(quote) = in_triple {
                if trimmed.matches(quote).count() % 2 == 1 {
                    in_triple = None;
                }
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            for quote in ["\"\"\"", "'''"] {
                if trimmed.matches(quote).count() % 2 == 1 {
                    in_triple = Some(quote);
                    break;
                }
            }

            lines.push((idx + 1, line));
        }

        lines
    }

    fn strip_comment(line: &str) -> &str {
        match line.find(" #") {
            Some(pos) => &line[..pos],
            None => line,
        }
    }
}

impl LanguageChecker for PythonChecker {
    fn family(&self) -> &'static str {
        "python"
    }

    fn check(&self, code: &str) -> CheckReport {
        let mut report = CheckReport::default();

        if let Err(e) = scan_delimiters(code, &LexSyntax::PYTHON) {
            report.errors.push(format!("syntax: {}", e));
        }

        let lines = Self::code_lines(code);

        if let Some((number, line)) = lines.first() {
            if Self::indent_of(line) > 0 {
                report
                    .errors
                    .push(format!("syntax: unexpected indent at line {}", number));
            }
        }

        for (pos, (number, line)) in lines.iter().enumerate() {
            let body = Self::strip_comment(line.trim()).trim_end();
            if !body.ends_with(':') || !PYTHON_BLOCK_HEADER.is_match(body) {
                continue;
            }
            let indented = lines
                .get(pos + 1)
                .map(|(_, next)| Self::indent_of(next) > Self::indent_of(line))
                .unwrap_or(false);
            if !indented {
                report.errors.push(format!(
                    "syntax: expected an indented block after line {}",
                    number
                ));
            }
        }

        let tab_indented = lines.iter().any(|(_, l)| l.starts_with('\t'));
        let space_indented = lines.iter().any(|(_, l)| l.starts_with(' '));
        if tab_indented && space_indented {
            report
                .warnings
                .push("mixed tab and space indentation".to_string());
        }

        if !PYTHON_DECL.is_match(code) {
            report
                .warnings
                .push("no recognizable top-level statement".to_string());
        }

        report
    }
}

/// JSON documents get a real parse.
pub struct JsonChecker;

impl LanguageChecker for JsonChecker {
    fn family(&self) -> &'static str {
        "json"
    }

    fn check(&self, code: &str) -> CheckReport {
        let mut report = CheckReport::default();
        if let Err(e) = serde_json::from_str::<serde_json::Value>(code) {
            report.errors.push(format!("syntax: invalid JSON: {}", e));
        }
        report
    }
}

/// YAML documents get a real parse.
pub struct YamlChecker;

impl LanguageChecker for YamlChecker {
    fn family(&self) -> &'static str {
        "yaml"
    }

    fn check(&self, code: &str) -> CheckReport {
        let mut report = CheckReport::default();
        if let Err(e) = serde_yaml::from_str::<serde_yaml::Value>(code) {
            report.errors.push(format!("syntax: invalid YAML: {}", e));
        }
        report
    }
}
