//! Deterministic structural pre-filter.
//!
//! The analyzer never talks to the network. A critical verdict here ends
//! the pipeline before any model is consulted.

pub mod checkers;
pub mod delimiters;
pub mod language;

pub use checkers::{checker_for, CheckReport, LanguageChecker};
pub use delimiters::{scan_delimiters, DelimiterError, DelimiterStats, LexSyntax};
pub use language::Language;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::types::{Severity, Verdict, ANALYSIS_COMPLETED, ANALYSIS_FAILED};

/// Evaluator identity recorded on every analyzer verdict.
pub const STATIC_ANALYZER_SOURCE: &str = "static-analyzer";

/// Lines longer than this produce a style warning.
pub const MAX_LINE_LENGTH: usize = 200;

lazy_static! {
    static ref WORK_MARKER: Regex = Regex::new(r"\b(?:TODO|FIXME|XXX)\b").unwrap();
}

/// Syntax, brace and structure checks for a candidate artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAnalyzer;

impl StaticAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze `code` written in `language`.
    ///
    /// Syntax errors yield a critical, rejected verdict. Style warnings
    /// alone yield an approved verdict with low severity.
    pub fn analyze(&self, code: &str, language: &str) -> Verdict {
        let language = Language::parse(language);

        if code.trim().is_empty() {
            return Verdict::new(
                STATIC_ANALYZER_SOURCE,
                false,
                vec!["artifact is empty".to_string()],
                Severity::Critical,
                Some(ANALYSIS_COMPLETED),
            );
        }

        let Some(checker) = checker_for(&language) else {
            debug!(language = %language, "No structural checker for language");
            return Verdict::new(
                STATIC_ANALYZER_SOURCE,
                true,
                vec![format!(
                    "analysis could not be performed: unsupported language '{}'",
                    language
                )],
                Severity::Low,
                Some(ANALYSIS_FAILED),
            );
        };

        let mut report = checker.check(code);
        report.warnings.extend(style_warnings(code, &language));

        debug!(
            language = %language,
            family = checker.family(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Static analysis complete"
        );

        let severity = if !report.errors.is_empty() {
            Severity::Critical
        } else if !report.warnings.is_empty() {
            Severity::Low
        } else {
            Severity::None
        };

        let approved = report.errors.is_empty();
        let mut issues = report.errors;
        issues.extend(report.warnings);

        Verdict::new(
            STATIC_ANALYZER_SOURCE,
            approved,
            issues,
            severity,
            Some(ANALYSIS_COMPLETED),
        )
    }
}

/// Style-level findings shared by every language.
fn style_warnings(code: &str, language: &Language) -> Vec<String> {
    let mut warnings = Vec::new();

    let long_lines = code
        .lines()
        .filter(|l| l.chars().count() > MAX_LINE_LENGTH)
        .count();
    if long_lines > 0 {
        warnings.push(format!(
            "style: {} line(s) longer than {} characters",
            long_lines, MAX_LINE_LENGTH
        ));
    }

    let trailing = code
        .lines()
        .filter(|l| l.ends_with(' ') || l.ends_with('\t'))
        .count();
    if trailing > 0 {
        warnings.push(format!(
            "style: {} line(s) with trailing whitespace",
            trailing
        ));
    }

    let markers = WORK_MARKER.find_iter(code).count();
    if markers > 0 {
        warnings.push(format!("style: {} TODO/FIXME marker(s)", markers));
    }

    // Python reports this itself as part of its indentation rules
    if *language != Language::Python {
        let tabs = code.lines().any(|l| l.starts_with('\t'));
        let spaces = code.lines().any(|l| l.starts_with("  "));
        if tabs && spaces {
            warnings.push("style: mixed tab and space indentation".to_string());
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_rust_passes() {
        let verdict = StaticAnalyzer::new().analyze(
            "pub fn square(x: u32) -> u32 {\n    x * x\n}\n",
            "rust",
        );
        assert!(verdict.approved);
        assert_eq!(verdict.severity, Severity::None);
        assert!(verdict.issues.is_empty());
        assert_eq!(verdict.confidence_hint, Some(ANALYSIS_COMPLETED));
        assert_eq!(verdict.source, STATIC_ANALYZER_SOURCE);
    }

    #[test]
    fn test_unbalanced_braces_are_critical() {
        let verdict = StaticAnalyzer::new().analyze(
            "function f(x) {\n  if (x) {\n    return 1;\n}\n",
            "javascript",
        );
        assert!(!verdict.approved);
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.primary_issue().unwrap().starts_with("syntax:"));
    }

    #[test]
    fn test_style_warnings_only_are_low() {
        let code = "pub fn f() {\n    // TODO: handle overflow\n    let x = 1; \n}\n";
        let verdict = StaticAnalyzer::new().analyze(code, "rs");
        assert!(verdict.approved);
        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.issues.len(), 2);
    }

    #[test]
    fn test_long_line_warning() {
        let code = format!("pub const S: &str = \"{}\";\n", "a".repeat(250));
        let verdict = StaticAnalyzer::new().analyze(&code, "rust");
        assert!(verdict.approved);
        assert!(verdict.issues[0].contains("longer than 200"));
    }

    #[test]
    fn test_empty_artifact_is_critical() {
        let verdict = StaticAnalyzer::new().analyze("   \n", "python");
        assert!(!verdict.approved);
        assert_eq!(verdict.severity, Severity::Critical);
    }

    #[test]
    fn test_unsupported_language_is_not_a_rejection() {
        let verdict = StaticAnalyzer::new().analyze("main = putStrLn \"hi\"", "haskell");
        assert!(verdict.approved);
        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.confidence_hint, Some(ANALYSIS_FAILED));
    }

    #[test]
    fn test_python_indentation_error_is_critical() {
        let verdict = StaticAnalyzer::new().analyze("if ready:\nlaunch()\n", "py");
        assert!(!verdict.approved);
        assert_eq!(verdict.severity, Severity::Critical);
    }

    #[test]
    fn test_valid_literals_are_not_syntax_errors() {
        let analyzer = StaticAnalyzer::new();
        let cases = [
            (
                "function escapeAttr(s) {\n  return s.replace(/\"/g, \"&quot;\");\n}\n",
                "javascript",
            ),
            (
                "pub fn quote() -> &'static str {\n    r#\"she said \"hi\"#\n}\n",
                "rust",
            ),
            (
                "class P {\n    string Root() { return @\"C:\\path \"\"quoted\"\"\"; }\n}\n",
                "csharp",
            ),
        ];
        for (code, language) in cases {
            let verdict = analyzer.analyze(code, language);
            assert!(verdict.approved, "{}: {:?}", language, verdict.issues);
            assert_ne!(verdict.severity, Severity::Critical);
        }
    }

    proptest! {
        #[test]
        fn prop_analysis_is_idempotent(code in "[ -~\n\t]{0,200}", lang in "(rust|python|js|go|json|cobol)") {
            let analyzer = StaticAnalyzer::new();
            prop_assert_eq!(analyzer.analyze(&code, &lang), analyzer.analyze(&code, &lang));
        }

        #[test]
        fn prop_critical_is_never_approved(code in "[ -~\n]{0,200}", lang in "(rust|python|c|java|yaml)") {
            let verdict = StaticAnalyzer::new().analyze(&code, &lang);
            if verdict.severity == Severity::Critical {
                prop_assert!(!verdict.approved);
            }
        }
    }
}
