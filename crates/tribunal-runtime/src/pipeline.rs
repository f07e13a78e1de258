//! Verification pipeline.
//!
//! Sequences the stages and applies the early-exit policy:
//!
//! ```text
//! Pending -> Static -> (Rejected | Judges)
//!                       Judges -> (Rejected | RejectedBySecurity | ArbiterDirect | Deep)
//!                       (ArbiterDirect | Deep) -> Arbiter -> Done
//! ```
//!
//! Once a run has started it always ends in a [`PipelineResult`]. Stage
//! failures become rejecting verdicts, and an exceeded overall deadline
//! becomes a rejection with reason `"timeout"`.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tribunal_core::{
    ConfidenceAggregator, DeepReview, PipelineResult, PoolOutcome, SecurityGate, StageName,
    StageResult, StaticAnalyzer, VerificationRequest, Verdict,
};

use crate::arbiter::Arbiter;
use crate::backends::{BackendError, BackendRegistry, ModelBackend, RetryBackend};
use crate::config::{ConfigError, PipelineConfig};
use crate::deep::DeepVerifier;
use crate::judge::Judge;
use crate::pool::{disputed_issues, JudgePool};
use crate::prompts::ArbiterEvidence;

/// Rejection reason for a run that exceeded its overall deadline.
pub const TIMEOUT_REASON: &str = "timeout";

/// Hard failures raised before a run starts.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No judge backends configured")]
    NoJudgeBackends,

    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("Invalid judge count: {0}")]
    InvalidJudgeCount(String),

    #[error("Failed to build backend '{id}': {source}")]
    Backend {
        id: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Static,
    Rejected,
    Judges,
    RejectedBySecurity,
    ArbiterDirect,
    Deep,
    Arbiter,
    Done,
}

impl PipelineState {
    /// Whether `next` is a legal successor. Every live state may jump
    /// straight to `Done` when the deadline fires.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done, _) => false,
            (_, Done) => true,
            (Pending, Static) => true,
            (Static, Rejected | Judges) => true,
            (Judges, Rejected | RejectedBySecurity | ArbiterDirect | Deep) => true,
            (ArbiterDirect | Deep, Arbiter) => true,
            _ => false,
        }
    }
}

/// Trace and state of one run.
struct Run {
    state: PipelineState,
    stages: Vec<StageResult>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Pending,
            stages: Vec::new(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "Unexpected pipeline transition");
        }
        debug!(from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }

    fn record(&mut self, stage: StageResult) {
        info!(
            stage = %stage.stage_name,
            skipped = stage.skipped,
            elapsed_ms = stage.elapsed.as_millis() as u64,
            "Stage finished"
        );
        self.stages.push(stage);
    }

    fn reject(
        mut self,
        state: PipelineState,
        reason: String,
        confidence: u8,
    ) -> PipelineResult {
        if state != PipelineState::Done {
            self.advance(state);
        }
        self.advance(PipelineState::Done);
        info!(reason = %reason, confidence, "Pipeline rejected");
        PipelineResult::rejected(reason, confidence, self.stages)
    }

    /// Fail closed: the interrupted stage is recorded as skipped and any
    /// partial credit is discarded.
    fn timed_out(mut self, stage: StageName, started: Instant) -> PipelineResult {
        warn!(stage = %stage, "Pipeline deadline exceeded");
        self.record(StageResult::skipped(
            stage,
            started.elapsed(),
            "pipeline deadline exceeded",
        ));
        self.advance(PipelineState::Done);
        PipelineResult::rejected(TIMEOUT_REASON, 0, self.stages)
    }
}

/// Builds a [`Pipeline`] from a config plus already-constructed backends.
pub struct PipelineBuilder {
    config: PipelineConfig,
    backends: BTreeMap<String, Arc<dyn ModelBackend>>,
    security: Option<SecurityGate>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            backends: BTreeMap::new(),
            security: None,
        }
    }

    /// Bind a backend identifier.
    pub fn backend(mut self, id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        self.backends.insert(id.into(), backend);
        self
    }

    /// Use this gate instead of the one described by the config.
    pub fn security_gate(mut self, gate: SecurityGate) -> Self {
        self.security = Some(gate);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.config.judge_backends.is_empty() {
            return Err(PipelineError::NoJudgeBackends);
        }

        self.config
            .check_judge_count(self.config.judge_count)
            .map_err(PipelineError::InvalidJudgeCount)?;

        let referenced = self
            .config
            .judge_backends
            .iter()
            .map(String::as_str)
            .chain(self.config.deep_backend_id())
            .chain(self.config.arbiter_backend_id());
        for id in referenced {
            if !self.backends.contains_key(id) {
                return Err(PipelineError::UnknownBackend(id.to_string()));
            }
        }

        let security = match self.security {
            Some(gate) => gate,
            None => SecurityGate::new(self.config.security.load_table()?),
        };

        info!(
            judges = self.config.judge_count,
            backends = self.backends.len(),
            rules = security.table().len(),
            deep_verification = self.config.deep_verification,
            "Pipeline ready"
        );

        Ok(Pipeline {
            config: self.config,
            backends: self.backends,
            analyzer: StaticAnalyzer::new(),
            security,
        })
    }
}

/// The multi-stage verification pipeline.
///
/// Holds no per-run state; concurrent `run` calls are independent.
pub struct Pipeline {
    config: PipelineConfig,
    backends: BTreeMap<String, Arc<dyn ModelBackend>>,
    analyzer: StaticAnalyzer,
    security: SecurityGate,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("security", &self.security)
            .finish()
    }
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Validate `config`, build every backend through `registry` and
    /// load the security pattern table.
    pub fn from_config(
        config: PipelineConfig,
        registry: &BackendRegistry,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut builder = PipelineBuilder::new(config.clone());
        for (id, spec) in &config.backends {
            let backend = registry
                .create(&spec.provider, &spec.options)
                .map_err(|source| PipelineError::Backend {
                    id: id.clone(),
                    source,
                })?;
            let backend: Arc<dyn ModelBackend> = if spec.retries > 0 {
                Arc::new(RetryBackend::new(backend, spec.retries))
            } else {
                backend
            };
            builder = builder.backend(id.clone(), backend);
        }
        builder.build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Verify one artifact.
    ///
    /// `Err` is returned only for requests that cannot start (unknown
    /// backend, unusable judge count). Everything after that is folded
    /// into the returned result.
    pub async fn run(&self, request: VerificationRequest) -> Result<PipelineResult, PipelineError> {
        let pool = self.judge_pool(&request)?;
        let deep = self.deep_verifier()?;
        let arbiter = self.arbiter()?;

        Ok(self.execute(Arc::new(request), pool, deep, arbiter).await)
    }

    fn backend(&self, id: &str) -> Result<Arc<dyn ModelBackend>, PipelineError> {
        self.backends
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownBackend(id.to_string()))
    }

    fn judge_pool(&self, request: &VerificationRequest) -> Result<JudgePool, PipelineError> {
        let ids = if request.judge_backends.is_empty() {
            &self.config.judge_backends
        } else {
            &request.judge_backends
        };
        if ids.is_empty() {
            return Err(PipelineError::NoJudgeBackends);
        }

        self.config
            .check_judge_count(request.judge_count)
            .map_err(PipelineError::InvalidJudgeCount)?;

        let judges = (0..request.judge_count)
            .map(|i| {
                let backend = self.backend(&ids[i % ids.len()])?;
                Ok(Judge::new(
                    format!("judge-{}", i + 1),
                    backend,
                    self.config.temperatures.judge,
                    self.config.timeouts.judge,
                ))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        Ok(JudgePool::new(judges))
    }

    fn deep_verifier(&self) -> Result<DeepVerifier, PipelineError> {
        let id = self
            .config
            .deep_backend_id()
            .ok_or(PipelineError::NoJudgeBackends)?;
        Ok(DeepVerifier::new(
            self.backend(id)?,
            self.config.temperatures.deep,
            self.config.timeouts.deep,
        ))
    }

    fn arbiter(&self) -> Result<Arbiter, PipelineError> {
        let id = self
            .config
            .arbiter_backend_id()
            .ok_or(PipelineError::NoJudgeBackends)?;
        Ok(Arbiter::new(
            self.backend(id)?,
            self.config.temperatures.arbiter,
            self.config.timeouts.arbiter,
        ))
    }

    async fn execute(
        &self,
        request: Arc<VerificationRequest>,
        pool: JudgePool,
        deep_verifier: DeepVerifier,
        arbiter: Arbiter,
    ) -> PipelineResult {
        let deadline = Instant::now() + self.config.timeouts.pipeline;
        let mut run = Run::new();

        // Static analysis
        run.advance(PipelineState::Static);
        let started = Instant::now();
        let static_verdict = self.analyzer.analyze(&request.code, &request.language);
        run.record(
            StageResult::completed(
                StageName::StaticAnalysis,
                started.elapsed(),
                vec![static_verdict.clone()],
            )
            .with_metadata("language", &request.language)
            .with_metadata("issues", static_verdict.issues.len()),
        );

        if static_verdict.is_critical() {
            let reason = format!(
                "Static analysis failed: {}",
                static_verdict.primary_issue().unwrap_or("critical error")
            );
            let confidence = ConfidenceAggregator::score(&static_verdict, None, None, None);
            return run.reject(PipelineState::Rejected, reason, confidence);
        }

        // Judge pool
        run.advance(PipelineState::Judges);
        debug!(judges = pool.len(), "Running judge pool");
        let started = Instant::now();
        let outcome = match tokio::time::timeout_at(deadline, pool.run(Arc::clone(&request))).await {
            Ok(outcome) => outcome,
            Err(_) => return run.timed_out(StageName::JudgePool, started),
        };
        run.record(
            StageResult::completed(StageName::JudgePool, started.elapsed(), outcome.verdicts.clone())
                .with_metadata("approvals", outcome.approvals)
                .with_metadata("judges", outcome.judge_count())
                .with_metadata("consensus", outcome.consensus)
                .with_metadata("issues", outcome.issues.len()),
        );

        if outcome.approvals <= self.config.thresholds.majority_reject_at_or_below {
            let reason = format!(
                "Majority rejection: {}/{} judges approved",
                outcome.approvals,
                outcome.judge_count()
            );
            let confidence = ConfidenceAggregator::score(&static_verdict, Some(&outcome), None, None);
            return run.reject(PipelineState::Rejected, reason, confidence);
        }

        // Security gate
        let started = Instant::now();
        let scan = self.security.scan(&request.code);
        run.record(
            StageResult::completed(StageName::SecurityGate, started.elapsed(), vec![scan.verdict.clone()])
                .with_metadata("risk_score", scan.risk_score)
                .with_metadata("matches", scan.matches.len()),
        );

        if scan.is_veto() {
            let reason = format!(
                "🛡 blocked by security gate: critical risk score {}",
                scan.risk_score
            );
            let confidence = ConfidenceAggregator::score(&static_verdict, Some(&outcome), None, None);
            return run.reject(PipelineState::RejectedBySecurity, reason, confidence);
        }

        // Deep verification
        let deep = if outcome.consensus {
            run.advance(PipelineState::ArbiterDirect);
            None
        } else if !self.config.deep_verification {
            run.advance(PipelineState::ArbiterDirect);
            run.record(StageResult::skipped(
                StageName::DeepVerification,
                std::time::Duration::ZERO,
                "deep verification disabled",
            ));
            None
        } else {
            run.advance(PipelineState::Deep);
            let started = Instant::now();
            let disputed = disputed_issues(&outcome);
            let review = match tokio::time::timeout_at(
                deadline,
                deep_verifier.reexamine(&request, &disputed),
            )
            .await
            {
                Ok(review) => review,
                Err(_) => return run.timed_out(StageName::DeepVerification, started),
            };
            run.record(deep_stage(&review, started.elapsed(), disputed.len()));
            Some(review)
        };

        // Arbiter
        run.advance(PipelineState::Arbiter);
        let started = Instant::now();
        let evidence = ArbiterEvidence {
            static_analysis: &static_verdict,
            judges: &outcome.verdicts,
            security: &scan,
            deep: deep.as_ref().map(|review| &review.verdict),
        };
        let decision = match tokio::time::timeout_at(deadline, arbiter.decide(&request, &evidence)).await {
            Ok(decision) => decision,
            Err(_) => return run.timed_out(StageName::Arbiter, started),
        };
        run.record(StageResult::completed(
            StageName::Arbiter,
            started.elapsed(),
            vec![decision.clone()],
        ));

        self.conclude(run, &static_verdict, &outcome, deep.as_ref(), &decision)
    }

    fn conclude(
        &self,
        mut run: Run,
        static_verdict: &Verdict,
        outcome: &PoolOutcome,
        deep: Option<&DeepReview>,
        decision: &Verdict,
    ) -> PipelineResult {
        let confidence =
            ConfidenceAggregator::score(static_verdict, Some(outcome), deep, Some(decision));

        if !decision.approved {
            let reason = format!(
                "Arbiter rejected: {}",
                decision.primary_issue().unwrap_or("no reason given")
            );
            return run.reject(PipelineState::Done, reason, confidence);
        }

        let min_confidence = self.config.thresholds.min_confidence;
        if min_confidence > 0 && confidence < min_confidence {
            let reason = format!(
                "Confidence {} below required minimum {}",
                confidence, min_confidence
            );
            return run.reject(PipelineState::Done, reason, confidence);
        }

        run.advance(PipelineState::Done);
        info!(confidence, "Pipeline verified");
        PipelineResult::accepted(confidence, run.stages)
    }
}

fn deep_stage(review: &DeepReview, elapsed: std::time::Duration, disputed: usize) -> StageResult {
    StageResult::completed(StageName::DeepVerification, elapsed, vec![review.verdict.clone()])
        .with_metadata("disputed", disputed)
        .with_metadata("confirmed", review.confirmed_issues.len())
        .with_metadata("dismissed", review.dismissed_issues.len())
        .with_metadata("new_issues", review.new_issues.len())
        .with_metadata("ambiguous", review.ambiguous)
        .with_metadata("completed", review.completed)
}
