//! Prompt templates for judges, the deep verifier and the arbiter.
//!
//! Each template ends with an explicit output contract so the response
//! can be handled by [`VerdictParser`](crate::parser::VerdictParser).

use tribunal_core::{SecurityScan, Verdict};

/// Evaluation prompt sent to every judge.
pub const JUDGE_PROMPT: &str = r#"
You are an independent code reviewer deciding whether machine-generated code is
correct and safe enough to ship.

## Task
{description}

## Context
{context}

## Code ({language})
```{language}
{code}
```

## Instructions
1. Check the code against the task: correctness, edge cases, error handling,
   resource handling and security.
2. Report only concrete problems you can point to in the code.
3. Do not reject for style preferences alone.
4. If you cannot decide, reject.

## Output Format (JSON only)
{
  "approved": true | false,
  "issues": ["one concrete problem per entry"],
  "severity": "none" | "low" | "medium" | "high" | "critical",
  "confidence": 0-100
}
"#;

/// Focused re-examination prompt for disputed issues.
pub const DEEP_VERIFICATION_PROMPT: &str = r#"
You are a senior reviewer settling a disagreement between independent reviewers
about machine-generated code.

## Task
{description}

## Context
{context}

## Code ({language})
```{language}
{code}
```

## Disputed Issues
Some reviewers raised the following issues; others approved the code.
{disputed_issues}

## Instructions
1. For each disputed issue, decide whether it is a real problem or a false positive.
2. Look for real problems none of the reviewers mentioned.
3. Approve only if no confirmed or new issue would block shipping.
4. If you genuinely cannot tell, set "approved" to null.

## Output Format (JSON only)
{
  "confirmed_issues": ["disputed issues that are real"],
  "false_positives": ["disputed issues that are not problems"],
  "new_issues": ["problems nobody raised"],
  "approved": true | false | null,
  "confidence": 0-100
}
"#;

/// Final decision prompt.
pub const ARBITER_PROMPT: &str = r#"
You are the final arbiter deciding whether machine-generated code ships.
Earlier stages have already run; their findings are summarized below.
Security and syntax vetoes have already been applied, so every artifact
you see passed them.

## Task
{description}

## Context
{context}

## Code ({language})
```{language}
{code}
```

## Stage Findings
{findings}

## Instructions
1. Weigh the findings; you may overrule a split reviewer vote.
2. Reject if any credible finding would make the code unsafe or incorrect.
3. Report how confident you are in your decision.

## Output Format (JSON only)
{
  "approved": true | false,
  "issues": ["blocking problems, empty if approved"],
  "severity": "none" | "low" | "medium" | "high" | "critical",
  "confidence": 0-100
}
"#;

const NO_CONTEXT: &str = "(none provided)";

/// Substitute `{name}` placeholders in one left-to-right pass.
///
/// Substituted text is never rescanned, so braces in the code, the
/// description or reviewer findings come through verbatim. Unknown
/// `{...}` sequences are left alone.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values_len(values));
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn values_len(values: &[(&str, &str)]) -> usize {
    values.iter().map(|(_, value)| value.len()).sum()
}

fn request_values<'a>(
    code: &'a str,
    language: &'a str,
    description: &'a str,
    context: Option<&'a str>,
) -> [(&'static str, &'a str); 4] {
    [
        ("code", code),
        ("language", language),
        ("description", description),
        ("context", context.unwrap_or(NO_CONTEXT)),
    ]
}

/// Build the prompt for one judge.
pub fn judge_prompt(code: &str, language: &str, description: &str, context: Option<&str>) -> String {
    fill(JUDGE_PROMPT, &request_values(code, language, description, context))
}

/// Build the deep verification prompt.
pub fn deep_verification_prompt(
    code: &str,
    language: &str,
    description: &str,
    context: Option<&str>,
    disputed_issues: &[String],
) -> String {
    let disputed = if disputed_issues.is_empty() {
        "- (reviewers rejected without naming specific issues)".to_string()
    } else {
        bullet_list(disputed_issues)
    };
    let mut values = request_values(code, language, description, context).to_vec();
    values.push(("disputed_issues", disputed.as_str()));
    fill(DEEP_VERIFICATION_PROMPT, &values)
}

/// Evidence handed to the arbiter.
pub struct ArbiterEvidence<'a> {
    pub static_analysis: &'a Verdict,
    pub judges: &'a [Verdict],
    pub security: &'a SecurityScan,
    pub deep: Option<&'a Verdict>,
}

/// Build the arbiter prompt from every earlier stage's findings.
pub fn arbiter_prompt(
    code: &str,
    language: &str,
    description: &str,
    context: Option<&str>,
    evidence: &ArbiterEvidence<'_>,
) -> String {
    let mut findings = String::new();

    findings.push_str(&format!(
        "### Static analysis\n{}\n\n",
        summarize(evidence.static_analysis)
    ));

    let approvals = evidence.judges.iter().filter(|v| v.approved).count();
    findings.push_str(&format!(
        "### Reviewers ({}/{} approved)\n",
        approvals,
        evidence.judges.len()
    ));
    for verdict in evidence.judges {
        findings.push_str(&format!("- {}\n", summarize(verdict)));
    }

    findings.push_str(&format!(
        "\n### Security scan (risk score {})\n{}\n",
        evidence.security.risk_score,
        summarize(&evidence.security.verdict)
    ));

    findings.push_str("\n### Deep verification\n");
    match evidence.deep {
        Some(verdict) => findings.push_str(&summarize(verdict)),
        None => findings.push_str("not run"),
    }

    let mut values = request_values(code, language, description, context).to_vec();
    values.push(("findings", findings.as_str()));
    fill(ARBITER_PROMPT, &values)
}

fn summarize(verdict: &Verdict) -> String {
    let decision = if verdict.approved { "approved" } else { "rejected" };
    if verdict.issues.is_empty() {
        format!("{}: {} (severity {})", verdict.source, decision, verdict.severity)
    } else {
        format!(
            "{}: {} (severity {}); issues: {}",
            verdict.source,
            decision,
            verdict.severity,
            verdict.issues.join("; ")
        )
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribunal_core::{SecurityGate, Severity};

    #[test]
    fn test_judge_prompt_fills_every_placeholder() {
        let prompt = judge_prompt("fn main() {}", "rust", "entry point", None);
        assert!(prompt.contains("```rust\nfn main() {}\n```"));
        assert!(prompt.contains("entry point"));
        assert!(prompt.contains(NO_CONTEXT));
        assert!(!prompt.contains("{description}"));
        assert!(!prompt.contains("{language}"));
    }

    #[test]
    fn test_code_braces_are_not_substituted() {
        let code = "let s = \"{description}\";";
        let prompt = judge_prompt(code, "rust", "demo", Some("ctx"));
        assert!(prompt.contains(code));
    }

    #[test]
    fn test_placeholders_in_values_are_not_expanded() {
        let code = "fn main() { let t = \"{language}\"; }";
        let issues = vec!["format string contains {code} and {context}".to_string()];
        let prompt = deep_verification_prompt(code, "rust", "render {code} safely", Some("ctx"), &issues);

        assert_eq!(prompt.matches(code).count(), 1);
        assert!(prompt.contains("render {code} safely"));
        assert!(prompt.contains("- format string contains {code} and {context}"));
        assert_eq!(prompt.matches("ctx").count(), 1);
    }

    #[test]
    fn test_arbiter_findings_are_inserted_verbatim() {
        let static_verdict = Verdict::new("static-analyzer", true, vec![], Severity::None, Some(100));
        let judges = vec![Verdict::new(
            "judge-1",
            false,
            vec!["{description} is echoed into SQL".into()],
            Severity::High,
            Some(70),
        )];
        let security = SecurityGate::default().scan("q = 1");
        let prompt = arbiter_prompt(
            "q = 1",
            "python",
            "build query",
            None,
            &ArbiterEvidence {
                static_analysis: &static_verdict,
                judges: &judges,
                security: &security,
                deep: None,
            },
        );
        assert!(prompt.contains("issues: {description} is echoed into SQL"));
        assert_eq!(prompt.matches("build query").count(), 1);
    }

    #[test]
    fn test_unknown_braces_are_kept() {
        let filled = fill("{ \"a\": {x} } {y", &[("x", "1")]);
        assert_eq!(filled, "{ \"a\": 1 } {y");
    }

    #[test]
    fn test_deep_prompt_lists_disputed_issues() {
        let issues = vec!["missing bounds check".to_string(), "unused import".to_string()];
        let prompt = deep_verification_prompt("x = 1", "python", "assign", None, &issues);
        assert!(prompt.contains("- missing bounds check\n- unused import"));
        assert!(prompt.contains("\"false_positives\""));
    }

    #[test]
    fn test_arbiter_prompt_summarizes_stages() {
        let static_verdict = Verdict::new("static-analyzer", true, vec![], Severity::None, Some(100));
        let judges = vec![
            Verdict::new("judge-1", true, vec![], Severity::None, Some(90)),
            Verdict::new("judge-2", false, vec!["leaks fd".into()], Severity::High, Some(80)),
        ];
        let security = SecurityGate::default().scan("x = 1");
        let prompt = arbiter_prompt(
            "x = 1",
            "python",
            "assign",
            None,
            &ArbiterEvidence {
                static_analysis: &static_verdict,
                judges: &judges,
                security: &security,
                deep: None,
            },
        );
        assert!(prompt.contains("Reviewers (1/2 approved)"));
        assert!(prompt.contains("judge-2: rejected (severity high); issues: leaks fd"));
        assert!(prompt.contains("risk score 0"));
        assert!(prompt.contains("not run"));
    }

    #[test]
    fn test_all_prompts_request_json() {
        for prompt in [JUDGE_PROMPT, DEEP_VERIFICATION_PROMPT, ARBITER_PROMPT] {
            assert!(prompt.contains("Output Format (JSON only)"));
            assert!(prompt.contains("\"approved\""));
        }
    }
}
