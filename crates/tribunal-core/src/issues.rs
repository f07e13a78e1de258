//! Issue deduplication across independent evaluators.
//!
//! Judges restate the same finding in different words ("Missing null
//! check" vs "missing null-check."). Two issues are duplicates when their
//! normalized text is equal or their word sets overlap strongly.

use std::collections::BTreeSet;

/// Token Jaccard similarity at or above which two issues are duplicates.
pub const DUPLICATE_SIMILARITY: f64 = 0.75;

/// Lowercase, strip punctuation and collapse whitespace.
fn normalize_issue(issue: &str) -> String {
    issue
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(normalized: &str) -> BTreeSet<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f64 / union as f64
}

/// Drop near-duplicate issues, keeping the first occurrence of each.
///
/// Blank issues are discarded. Output order follows input order.
pub fn dedupe_issues<I, S>(issues: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept: Vec<(String, String)> = Vec::new();

    for issue in issues {
        let original = issue.as_ref().trim();
        let normalized = normalize_issue(original);
        if normalized.is_empty() {
            continue;
        }

        let candidate = tokens(&normalized);
        let duplicate = kept.iter().any(|(_, seen)| {
            *seen == normalized || jaccard(&tokens(seen), &candidate) >= DUPLICATE_SIMILARITY
        });

        if !duplicate {
            kept.push((original.to_string(), normalized));
        }
    }

    kept.into_iter().map(|(original, _)| original).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_issue("  Missing NULL-check, in parse()! "),
            "missing null check in parse"
        );
    }

    #[test]
    fn test_exact_restatement_is_removed() {
        let issues = dedupe_issues(["Missing null check", "missing null-check."]);
        assert_eq!(issues, vec!["Missing null check"]);
    }

    #[test]
    fn test_similar_wording_is_removed() {
        let issues = dedupe_issues([
            "Function does not handle empty input list",
            "function does not handle an empty input list",
            "Integer overflow on large values",
        ]);
        assert_eq!(
            issues,
            vec![
                "Function does not handle empty input list",
                "Integer overflow on large values"
            ]
        );
    }

    #[test]
    fn test_distinct_issues_survive() {
        let issues = dedupe_issues([
            "SQL query built with string concatenation",
            "Password logged in plaintext",
        ]);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_blank_issues_are_dropped() {
        let issues = dedupe_issues(["", "  ", "--", "real problem"]);
        assert_eq!(issues, vec!["real problem"]);
    }

    #[test]
    fn test_similarity_bounds() {
        let similarity = |a: &str, b: &str| jaccard(&tokens(a), &tokens(b));
        assert_eq!(similarity("a b", "a b"), 1.0);
        assert_eq!(similarity("a b", "c d"), 0.0);
        assert!((similarity("a b c", "a b d") - 0.5).abs() < f64::EPSILON);
    }
}
