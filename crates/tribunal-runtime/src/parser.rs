//! Structured verdict extraction from free-form model output.
//!
//! Models wrap their JSON in prose, markdown fences, or both. The parser
//! tries fenced blocks first, then any balanced `{...}` substring, and
//! accepts the first candidate that is a JSON object. Anything it cannot
//! turn into a decision is a [`ParseFailure`], which callers fold into a
//! rejecting verdict.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use tribunal_core::{DeepReview, Severity, Verdict};

/// Confidence hint recorded when the deep verifier can neither confirm
/// nor deny the disputed issues.
pub const AMBIGUOUS_CONFIDENCE: u8 = 50;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap();
}

/// Why a response could not be turned into a verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("empty response")]
    EmptyResponse,

    #[error("no JSON object in response")]
    NoJson,

    #[error("invalid JSON in response: {0}")]
    InvalidJson(String),

    #[error("response has no approve/reject decision")]
    MissingDecision,
}

/// Shared response parser for judges, the deep verifier and the arbiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictParser;

impl VerdictParser {
    /// Find the first JSON object in `text`.
    pub fn extract_object(text: &str) -> Result<Map<String, Value>, ParseFailure> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseFailure::EmptyResponse);
        }

        let mut last_error = None;

        let fenced = FENCED_BLOCK
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim()));
        let candidates = fenced
            .chain(std::iter::once(text))
            .chain(balanced_objects(text));

        for candidate in candidates {
            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(map)) => return Ok(map),
                Ok(_) => {}
                Err(e) => {
                    if candidate.starts_with('{') {
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => ParseFailure::InvalidJson(e),
            None => ParseFailure::NoJson,
        })
    }

    /// Parse a judge or arbiter response into a verdict for `source`.
    pub fn parse(text: &str, source: &str) -> Result<Verdict, ParseFailure> {
        let object = Self::extract_object(text)?;
        let approved = decision(&object).ok_or(ParseFailure::MissingDecision)?;
        let issues = issue_list(object.get("issues"));
        let severity = severity(&object).unwrap_or(if approved {
            if issues.is_empty() {
                Severity::None
            } else {
                Severity::Low
            }
        } else {
            Severity::Medium
        });
        let confidence = confidence(object.get("confidence"));

        debug!(
            source,
            approved,
            issues = issues.len(),
            severity = %severity,
            confidence = ?confidence,
            "Parsed verdict"
        );

        Ok(Verdict::new(source, approved, issues, severity, confidence))
    }

    /// Parse a deep verification response.
    ///
    /// A missing or null decision is not a failure here: it means the
    /// verifier could not make up its mind, which is recorded as an
    /// ambiguous, non-approving review with partial confidence.
    pub fn parse_review(text: &str, source: &str) -> Result<DeepReview, ParseFailure> {
        let object = Self::extract_object(text)?;

        let confirmed_issues = issue_list(object.get("confirmed_issues"));
        let dismissed_issues = issue_list(
            object
                .get("false_positives")
                .or_else(|| object.get("dismissed_issues")),
        );
        let new_issues = issue_list(object.get("new_issues"));

        let mut findings: Vec<String> = confirmed_issues.clone();
        findings.extend(new_issues.iter().cloned());

        let verdict = match decision(&object) {
            Some(true) => {
                let severity = severity(&object).unwrap_or(if findings.is_empty() {
                    Severity::None
                } else {
                    Severity::Low
                });
                Verdict::new(source, true, findings, severity, confidence(object.get("confidence")))
            }
            Some(false) => {
                let severity = severity(&object).unwrap_or(Severity::High);
                Verdict::new(source, false, findings, severity, confidence(object.get("confidence")))
            }
            None => {
                if findings.is_empty() {
                    findings.push(
                        "deep verification could not confirm or deny the disputed issues"
                            .to_string(),
                    );
                }
                Verdict::new(
                    source,
                    false,
                    findings,
                    Severity::Medium,
                    Some(AMBIGUOUS_CONFIDENCE),
                )
            }
        };

        let ambiguous = decision(&object).is_none();
        debug!(
            source,
            approved = verdict.approved,
            ambiguous,
            confirmed = confirmed_issues.len(),
            dismissed = dismissed_issues.len(),
            new = new_issues.len(),
            "Parsed deep review"
        );

        Ok(DeepReview {
            verdict,
            confirmed_issues,
            dismissed_issues,
            new_issues,
            ambiguous,
            completed: true,
        })
    }
}

/// Every top-level balanced `{...}` substring, skipping braces in strings.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        found.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    found
}

fn decision(object: &Map<String, Value>) -> Option<bool> {
    let value = ["approved", "approve", "verdict", "decision"]
        .iter()
        .find_map(|key| object.get(*key))?;

    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" | "accept" | "accepted" | "pass" | "yes" | "true" => {
                Some(true)
            }
            "reject" | "rejected" | "deny" | "denied" | "fail" | "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn issue_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(issue_text).collect(),
        Some(single @ Value::String(_)) => issue_text(single).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn issue_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => ["description", "issue", "message", "title"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn severity(object: &Map<String, Value>) -> Option<Severity> {
    object
        .get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse_loose)
}

/// Accept 0-100 integers, 0.0-1.0 fractions and "95%" strings.
fn confidence(value: Option<&Value>) -> Option<u8> {
    let (number, fractional) = match value? {
        Value::Number(n) => match n.as_u64() {
            Some(whole) => (whole as f64, false),
            None => (n.as_f64()?, true),
        },
        Value::String(s) => {
            let s = s.trim();
            let percent = s.ends_with('%');
            let n: f64 = s.trim_end_matches('%').trim().parse().ok()?;
            (n, !percent && s.contains('.'))
        }
        _ => return None,
    };

    if !number.is_finite() || number < 0.0 {
        return None;
    }
    let scaled = if fractional && number <= 1.0 {
        number * 100.0
    } else {
        number
    };
    Some(scaled.round().min(100.0) as u8)
}
