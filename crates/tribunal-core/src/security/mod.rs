//! Deterministic security gate.
//!
//! Scans the artifact against a pattern table and turns the matches into
//! a risk score and a verdict. A critical verdict is a veto that no later
//! stage can override.

pub mod patterns;
pub mod schema;
pub mod table;

pub use patterns::{builtin_rules, builtin_table};
pub use schema::validate_pattern_table;
pub use table::{CompiledRule, PatternMatch, PatternRule, PatternTable, PatternTableError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{Severity, Verdict, ANALYSIS_COMPLETED};

/// Evaluator identity recorded on every gate verdict.
pub const SECURITY_GATE_SOURCE: &str = "security-gate";

/// Upper bound of the risk score.
pub const MAX_RISK_SCORE: u8 = 100;

/// Full output of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScan {
    pub verdict: Verdict,

    /// Sum of matched rule weights, capped at 100
    pub risk_score: u8,

    pub matches: Vec<PatternMatch>,
}

impl SecurityScan {
    /// True when the gate blocks the artifact outright.
    pub fn is_veto(&self) -> bool {
        self.verdict.is_critical()
    }
}

/// Pattern-based scanner with no network access.
#[derive(Debug, Clone)]
pub struct SecurityGate {
    table: PatternTable,
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::new(builtin_table())
    }
}

impl SecurityGate {
    pub fn new(table: PatternTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    /// Scan `code` and grade it.
    pub fn scan(&self, code: &str) -> SecurityScan {
        let matches = self.table.scan(code);

        let total: u32 = matches.iter().map(|m| m.severity.weight()).sum();
        let risk_score = total.min(MAX_RISK_SCORE as u32) as u8;

        let strongest = matches
            .iter()
            .map(|m| m.severity)
            .max()
            .unwrap_or(Severity::None);
        let severity = Severity::from_risk_score(risk_score).max(strongest);

        let issues: Vec<String> = matches
            .iter()
            .map(|m| {
                format!(
                    "[{}] {} (line {}, {})",
                    m.category, m.description, m.line, m.severity
                )
            })
            .collect();

        let verdict = Verdict::new(
            SECURITY_GATE_SOURCE,
            severity < Severity::High,
            issues,
            severity,
            Some(ANALYSIS_COMPLETED),
        );

        if verdict.is_critical() {
            warn!(
                risk_score,
                matches = matches.len(),
                "Security gate veto"
            );
        } else {
            debug!(
                risk_score,
                severity = %severity,
                matches = matches.len(),
                "Security scan complete"
            );
        }

        SecurityScan {
            verdict,
            risk_score,
            matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gate_with(rules: Vec<PatternRule>) -> SecurityGate {
        SecurityGate::new(PatternTable::compile(rules).unwrap())
    }

    #[test]
    fn test_clean_code_scores_zero() {
        let scan = SecurityGate::default().scan("fn main() {\n    println!(\"ok\");\n}\n");
        assert_eq!(scan.risk_score, 0);
        assert!(scan.verdict.approved);
        assert_eq!(scan.verdict.severity, Severity::None);
        assert!(!scan.is_veto());
    }

    #[test]
    fn test_single_critical_rule_vetoes() {
        let scan = SecurityGate::default().scan("import os\nos.system(cmd)\n");
        assert_eq!(scan.risk_score, 50);
        assert_eq!(scan.verdict.severity, Severity::Critical);
        assert!(!scan.verdict.approved);
        assert!(scan.is_veto());
        assert!(scan.verdict.issues[0].starts_with("[code_execution]"));
        assert!(scan.verdict.issues[0].contains("line 2"));
    }

    #[test]
    fn test_weights_accumulate_into_bands() {
        let gate = gate_with(vec![
            PatternRule::new("a", "alpha", Severity::Medium, "a"),
            PatternRule::new("b", "beta", Severity::Medium, "b"),
        ]);
        let scan = gate.scan("alpha beta");
        assert_eq!(scan.risk_score, 30);
        assert_eq!(scan.verdict.severity, Severity::Medium);
        assert!(scan.verdict.approved);

        let gate = gate_with(vec![
            PatternRule::new("a", "alpha", Severity::High, "a"),
            PatternRule::new("b", "beta", Severity::High, "b"),
            PatternRule::new("c", "gamma", Severity::Medium, "c"),
        ]);
        let scan = gate.scan("alpha beta gamma");
        assert_eq!(scan.risk_score, 75);
        assert_eq!(scan.verdict.severity, Severity::High);
        assert!(!scan.verdict.approved);
        assert!(!scan.is_veto());
    }

    #[test]
    fn test_score_is_capped_and_escalates_to_critical() {
        let gate = gate_with(vec![
            PatternRule::new("a", "alpha", Severity::High, "a"),
            PatternRule::new("b", "beta", Severity::High, "b"),
            PatternRule::new("c", "gamma", Severity::High, "c"),
            PatternRule::new("d", "delta", Severity::High, "d"),
        ]);
        let scan = gate.scan("alpha beta gamma delta");
        assert_eq!(scan.risk_score, MAX_RISK_SCORE);
        assert!(scan.is_veto());
    }

    #[test]
    fn test_repeated_matches_count_once() {
        let gate = gate_with(vec![PatternRule::new("a", "alpha", Severity::Low, "a")]);
        let scan = gate.scan("alpha alpha alpha");
        assert_eq!(scan.risk_score, 5);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.verdict.severity, Severity::Low);
    }

    proptest! {
        #[test]
        fn prop_scan_is_idempotent(code in "[ -~\n]{0,300}") {
            let gate = SecurityGate::default();
            prop_assert_eq!(gate.scan(&code), gate.scan(&code));
        }

        #[test]
        fn prop_risk_score_is_bounded(code in "(eval\\(|os\\.system\\(|/dev/tcp/|import ctypes\n|x){0,12}") {
            let scan = SecurityGate::default().scan(&code);
            prop_assert!(scan.risk_score <= MAX_RISK_SCORE);
            if scan.verdict.severity == Severity::Critical {
                prop_assert!(!scan.verdict.approved);
            }
        }
    }
}
