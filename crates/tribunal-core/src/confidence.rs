//! Confidence aggregation.
//!
//! Fixed weights: static analysis 20, judge pool 40, deep verification 20,
//! arbiter 20. The score is a pure function of the stage outputs.

use serde::{Deserialize, Serialize};

use crate::types::{DeepReview, PoolOutcome, Verdict, ANALYSIS_COMPLETED};

pub const STATIC_WEIGHT: f64 = 20.0;
pub const POOL_WEIGHT: f64 = 40.0;
pub const DEEP_WEIGHT: f64 = 20.0;
pub const ARBITER_WEIGHT: f64 = 20.0;

/// Arbiter self-confidence that earns the full arbiter weight.
pub const ARBITER_FULL_CREDIT_AT: u8 = 95;

/// Arbiter self-confidence that earns half the arbiter weight.
pub const ARBITER_PARTIAL_CREDIT_AT: u8 = 80;

/// Per-stage contributions to the final score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub static_analysis: f64,
    pub judge_pool: f64,
    pub deep_verification: f64,
    pub arbiter: f64,
}

impl ConfidenceBreakdown {
    /// Rounded sum, clamped to 0..=100.
    pub fn total(&self) -> u8 {
        let sum = self.static_analysis + self.judge_pool + self.deep_verification + self.arbiter;
        sum.round().clamp(0.0, 100.0) as u8
    }
}

/// Combines stage verdicts into a single 0-100 confidence score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceAggregator;

impl ConfidenceAggregator {
    /// Score a run. Stages that never ran are passed as `None`.
    pub fn score(
        static_verdict: &Verdict,
        pool: Option<&PoolOutcome>,
        deep: Option<&DeepReview>,
        arbiter: Option<&Verdict>,
    ) -> u8 {
        Self::breakdown(static_verdict, pool, deep, arbiter).total()
    }

    pub fn breakdown(
        static_verdict: &Verdict,
        pool: Option<&PoolOutcome>,
        deep: Option<&DeepReview>,
        arbiter: Option<&Verdict>,
    ) -> ConfidenceBreakdown {
        ConfidenceBreakdown {
            static_analysis: static_credit(static_verdict),
            judge_pool: pool.map(|p| POOL_WEIGHT * p.approval_ratio()).unwrap_or(0.0),
            deep_verification: deep_credit(pool, deep),
            arbiter: arbiter.map(arbiter_credit).unwrap_or(0.0),
        }
    }
}

fn static_credit(verdict: &Verdict) -> f64 {
    if verdict.approved && verdict.confidence_hint == Some(ANALYSIS_COMPLETED) {
        STATIC_WEIGHT
    } else {
        0.0
    }
}

fn deep_credit(pool: Option<&PoolOutcome>, deep: Option<&DeepReview>) -> f64 {
    match deep {
        Some(review) if review.confirms_approval() => DEEP_WEIGHT,
        Some(review) if review.completed && !review.found_new_issues() => DEEP_WEIGHT / 2.0,
        Some(_) => 0.0,
        // Not needed: the pool already agreed the artifact is fine
        None if pool.map(PoolOutcome::unanimous_approval).unwrap_or(false) => DEEP_WEIGHT,
        None => 0.0,
    }
}

fn arbiter_credit(verdict: &Verdict) -> f64 {
    if !verdict.approved {
        return 0.0;
    }
    match verdict.confidence_hint {
        Some(c) if c >= ARBITER_FULL_CREDIT_AT => ARBITER_WEIGHT,
        Some(c) if c >= ARBITER_PARTIAL_CREDIT_AT => ARBITER_WEIGHT / 2.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use proptest::prelude::*;

    fn verdict(approved: bool, hint: Option<u8>) -> Verdict {
        Verdict::new("test", approved, vec![], Severity::None, hint)
    }

    fn pool(approvals: usize, n: usize) -> PoolOutcome {
        let verdicts = (0..n)
            .map(|i| verdict(i < approvals, Some(90)))
            .collect::<Vec<_>>();
        PoolOutcome {
            verdicts,
            approvals,
            consensus: approvals == 0 || approvals == n,
            issues: vec![],
        }
    }

    fn review(approved: bool, completed: bool, new_issues: Vec<String>) -> DeepReview {
        DeepReview {
            verdict: verdict(approved, Some(80)),
            confirmed_issues: vec![],
            dismissed_issues: vec![],
            new_issues,
            ambiguous: false,
            completed,
        }
    }

    #[test]
    fn test_perfect_run_scores_100() {
        let score = ConfidenceAggregator::score(
            &verdict(true, Some(100)),
            Some(&pool(4, 4)),
            None,
            Some(&verdict(true, Some(97))),
        );
        assert_eq!(score, 100);
    }

    #[test]
    fn test_disputed_pool_with_confirming_deep_review() {
        let score = ConfidenceAggregator::score(
            &verdict(true, Some(100)),
            Some(&pool(2, 4)),
            Some(&review(true, true, vec![])),
            Some(&verdict(true, Some(96))),
        );
        assert_eq!(score, 20 + 20 + 20 + 20);
    }

    #[test]
    fn test_deep_review_partial_credit() {
        let breakdown = ConfidenceAggregator::breakdown(
            &verdict(true, Some(100)),
            Some(&pool(3, 4)),
            Some(&review(false, true, vec![])),
            Some(&verdict(true, Some(85))),
        );
        assert_eq!(breakdown.judge_pool, 30.0);
        assert_eq!(breakdown.deep_verification, 10.0);
        assert_eq!(breakdown.arbiter, 10.0);
        assert_eq!(breakdown.total(), 70);
    }

    #[test]
    fn test_deep_review_new_issues_earn_nothing() {
        let breakdown = ConfidenceAggregator::breakdown(
            &verdict(true, Some(100)),
            Some(&pool(2, 4)),
            Some(&review(false, true, vec!["race condition".to_string()])),
            None,
        );
        assert_eq!(breakdown.deep_verification, 0.0);
    }

    #[test]
    fn test_failed_deep_review_earns_nothing() {
        let breakdown = ConfidenceAggregator::breakdown(
            &verdict(true, Some(100)),
            Some(&pool(2, 4)),
            Some(&review(false, false, vec![])),
            None,
        );
        assert_eq!(breakdown.deep_verification, 0.0);
    }

    #[test]
    fn test_skipped_deep_review_after_split_earns_nothing() {
        let breakdown = ConfidenceAggregator::breakdown(
            &verdict(true, Some(100)),
            Some(&pool(3, 4)),
            None,
            None,
        );
        assert_eq!(breakdown.deep_verification, 0.0);
    }

    #[test]
    fn test_arbiter_thresholds() {
        let base = verdict(true, Some(100));
        let with_arbiter =
            |a: Verdict| ConfidenceAggregator::breakdown(&base, None, None, Some(&a)).arbiter;
        assert_eq!(with_arbiter(verdict(true, Some(95))), 20.0);
        assert_eq!(with_arbiter(verdict(true, Some(94))), 10.0);
        assert_eq!(with_arbiter(verdict(true, Some(80))), 10.0);
        assert_eq!(with_arbiter(verdict(true, Some(79))), 0.0);
        assert_eq!(with_arbiter(verdict(true, None)), 0.0);
        assert_eq!(with_arbiter(verdict(false, Some(99))), 0.0);
    }

    #[test]
    fn test_static_needs_completed_analysis() {
        let score = ConfidenceAggregator::score(&verdict(true, Some(0)), None, None, None);
        assert_eq!(score, 0);
        let score = ConfidenceAggregator::score(&verdict(true, Some(100)), None, None, None);
        assert_eq!(score, 20);
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded(
            static_ok in any::<bool>(),
            static_hint in proptest::option::of(0u8..=255),
            n in 1usize..12,
            approvals_seed in 0usize..12,
            deep in proptest::option::of((any::<bool>(), any::<bool>(), any::<bool>())),
            arbiter in proptest::option::of((any::<bool>(), proptest::option::of(0u8..=255))),
        ) {
            let approvals = approvals_seed % (n + 1);
            let static_verdict = verdict(static_ok, static_hint);
            let pool = pool(approvals, n);
            let deep = deep.map(|(approved, completed, new)| {
                review(approved, completed, if new { vec!["x".to_string()] } else { vec![] })
            });
            let arbiter = arbiter.map(|(approved, hint)| verdict(approved, hint));

            let score = ConfidenceAggregator::score(
                &static_verdict,
                Some(&pool),
                deep.as_ref(),
                arbiter.as_ref(),
            );
            prop_assert!(score <= 100);
        }
    }
}
