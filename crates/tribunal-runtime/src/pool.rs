//! Concurrent judge fan-out.
//!
//! Every judge runs in its own task. Results are slotted back by index, so
//! output order always matches judge order regardless of completion order.
//! A judge that panics or is aborted still occupies its slot as a
//! rejection.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use tribunal_core::{dedupe_issues, PoolOutcome, Verdict, VerificationRequest};

use crate::judge::Judge;

/// A set of judges evaluated in parallel.
#[derive(Debug, Clone, Default)]
pub struct JudgePool {
    judges: Vec<Judge>,
}

impl JudgePool {
    pub fn new(judges: Vec<Judge>) -> Self {
        Self { judges }
    }

    pub(crate) fn len(&self) -> usize {
        self.judges.len()
    }

    /// Run every judge concurrently and aggregate their verdicts.
    ///
    /// Each judge carries its own timeout, so this returns once the slowest
    /// judge answers or times out. Dropping the returned future aborts
    /// every outstanding judge.
    pub async fn run(&self, request: Arc<VerificationRequest>) -> PoolOutcome {
        let mut slots: Vec<Verdict> = self
            .judges
            .iter()
            .map(|judge| {
                Verdict::unresolved(judge.id(), format!("{} task did not complete", judge.id()))
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (idx, judge) in self.judges.iter().cloned().enumerate() {
            let request = Arc::clone(&request);
            tasks.spawn(async move { (idx, judge.evaluate(&request).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, verdict)) => slots[idx] = verdict,
                Err(e) => warn!(error = %e, "Judge task failed, counting as rejection"),
            }
        }

        let outcome = aggregate(slots);
        info!(
            judges = outcome.judge_count(),
            approvals = outcome.approvals,
            consensus = outcome.consensus,
            issues = outcome.issues.len(),
            "Judge pool complete"
        );
        outcome
    }
}

/// Count approvals, decide consensus and merge issues.
pub fn aggregate(verdicts: Vec<Verdict>) -> PoolOutcome {
    let approvals = verdicts.iter().filter(|v| v.approved).count();
    let consensus = !verdicts.is_empty() && (approvals == verdicts.len() || approvals == 0);
    let issues = dedupe_issues(verdicts.iter().flat_map(|v| v.issues.iter()));

    PoolOutcome {
        verdicts,
        approvals,
        consensus,
        issues,
    }
}

/// Deduplicated issues raised by the judges that rejected.
pub fn disputed_issues(outcome: &PoolOutcome) -> Vec<String> {
    dedupe_issues(
        outcome
            .verdicts
            .iter()
            .filter(|v| !v.approved)
            .flat_map(|v| v.issues.iter()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, ModelBackend};
    use crate::test_support::{approve, reject, ScriptedBackend};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn judge(idx: usize, backend: Arc<dyn ModelBackend>) -> Judge {
        Judge::new(format!("judge-{}", idx + 1), backend, 0.2, TIMEOUT)
    }

    fn request() -> Arc<VerificationRequest> {
        Arc::new(VerificationRequest::new("fn f() {}", "rust", "no-op"))
    }

    #[tokio::test]
    async fn test_unanimous_approval() {
        let backend: Arc<dyn ModelBackend> = Arc::new(ScriptedBackend::always("b", &approve(90)));
        let pool = JudgePool::new((0..4).map(|i| judge(i, backend.clone())).collect());

        let outcome = pool.run(request()).await;
        assert_eq!(outcome.judge_count(), 4);
        assert_eq!(outcome.approvals, 4);
        assert!(outcome.consensus);
        assert!(outcome.unanimous_approval());
    }

    #[tokio::test]
    async fn test_split_vote_is_disputed_and_deduplicated() {
        let backends: Vec<Arc<dyn ModelBackend>> = vec![
            Arc::new(ScriptedBackend::always("a", &approve(90))),
            Arc::new(ScriptedBackend::always("b", &reject("Missing null check"))),
            Arc::new(ScriptedBackend::always("c", &approve(80))),
            Arc::new(ScriptedBackend::always("d", &reject("missing null-check"))),
        ];
        let pool = JudgePool::new(
            backends
                .into_iter()
                .enumerate()
                .map(|(i, b)| judge(i, b))
                .collect(),
        );

        let outcome = pool.run(request()).await;
        assert_eq!(outcome.approvals, 2);
        assert!(!outcome.consensus);
        assert_eq!(outcome.issues, vec!["Missing null check"]);
        assert_eq!(disputed_issues(&outcome), vec!["Missing null check"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_judges_not_completion() {
        let backends: Vec<Arc<dyn ModelBackend>> = vec![
            Arc::new(ScriptedBackend::slow("slow", Duration::from_secs(10), &reject("slow issue"))),
            Arc::new(ScriptedBackend::always("fast", &approve(95))),
        ];
        let pool = JudgePool::new(
            backends
                .into_iter()
                .enumerate()
                .map(|(i, b)| judge(i, b))
                .collect(),
        );

        let outcome = pool.run(request()).await;
        assert_eq!(outcome.verdicts[0].source, "judge-1");
        assert!(!outcome.verdicts[0].approved);
        assert_eq!(outcome.verdicts[1].source, "judge-2");
        assert!(outcome.verdicts[1].approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_judge_does_not_block_siblings() {
        let backends: Vec<Arc<dyn ModelBackend>> = vec![
            Arc::new(ScriptedBackend::slow("hung", Duration::from_secs(3600), &approve(99))),
            Arc::new(ScriptedBackend::always("ok", &approve(90))),
            Arc::new(ScriptedBackend::failing("down", BackendError::HttpError("refused".into()))),
        ];
        let pool = JudgePool::new(
            backends
                .into_iter()
                .enumerate()
                .map(|(i, b)| judge(i, b))
                .collect(),
        );

        let started = tokio::time::Instant::now();
        let outcome = pool.run(request()).await;
        assert!(started.elapsed() <= TIMEOUT + Duration::from_secs(1));
        assert_eq!(outcome.approvals, 1);
        assert!(!outcome.verdicts[0].approved);
        assert!(outcome.verdicts[0].issues[0].contains("no response within"));
        assert!(!outcome.verdicts[2].approved);
    }

    #[test]
    fn test_aggregate_unanimous_rejection_is_consensus() {
        let verdicts = vec![
            Verdict::unresolved("judge-1", "x"),
            Verdict::unresolved("judge-2", "x"),
        ];
        let outcome = aggregate(verdicts);
        assert_eq!(outcome.approvals, 0);
        assert!(outcome.consensus);
        assert!(!outcome.unanimous_approval());
    }

    #[test]
    fn test_aggregate_empty_is_not_consensus() {
        let outcome = aggregate(vec![]);
        assert!(!outcome.consensus);
    }
}
