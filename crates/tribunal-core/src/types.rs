//! Shared data model for every pipeline stage.
//!
//! All of these values are created fresh for a single evaluation and
//! discarded once the caller has read the [`PipelineResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default number of judges in a pool.
pub const DEFAULT_JUDGE_COUNT: usize = 4;

/// Confidence hint reported by a deterministic stage that completed.
pub const ANALYSIS_COMPLETED: u8 = 100;

/// Confidence hint reported by a deterministic stage that could not run.
pub const ANALYSIS_FAILED: u8 = 0;

/// Severity attached to a verdict.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Contribution of one matched rule of this severity to a risk score.
    pub fn weight(self) -> u32 {
        match self {
            Severity::None => 0,
            Severity::Low => 5,
            Severity::Medium => 15,
            Severity::High => 30,
            Severity::Critical => 50,
        }
    }

    /// Band a 0-100 risk score into a severity.
    pub fn from_risk_score(score: u8) -> Self {
        match score {
            0 => Severity::None,
            1..=24 => Severity::Low,
            25..=49 => Severity::Medium,
            50..=79 => Severity::High,
            _ => Severity::Critical,
        }
    }

    /// Lenient parse used for model output ("crit", "HIGH", "moderate").
    pub fn parse_loose(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "none" | "no" | "ok" | "info" => Some(Severity::None),
            "low" | "minor" => Some(Severity::Low),
            "medium" | "moderate" | "med" => Some(Severity::Medium),
            "high" | "major" | "severe" => Some(Severity::High),
            "critical" | "crit" | "blocker" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The output of one evaluator.
///
/// Construct through [`Verdict::new`] (or the helpers built on it) so that
/// a critical severity can never be recorded as approved. Deserialization
/// goes through the same constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawVerdict")]
pub struct Verdict {
    /// Evaluator identity, e.g. "judge-2", "security-gate", "arbiter"
    pub source: String,

    /// Approve/reject flag
    pub approved: bool,

    /// Problems found, in the order they were reported
    #[serde(default)]
    pub issues: Vec<String>,

    /// Severity of the findings
    #[serde(default)]
    pub severity: Severity,

    /// Evaluator's self-reported confidence (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_hint: Option<u8>,
}

/// Wire shape of [`Verdict`] before its invariants are applied.
#[derive(Deserialize)]
struct RawVerdict {
    source: String,
    approved: bool,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    confidence_hint: Option<u8>,
}

impl From<RawVerdict> for Verdict {
    fn from(raw: RawVerdict) -> Self {
        Verdict::new(raw.source, raw.approved, raw.issues, raw.severity, raw.confidence_hint)
    }
}

impl Verdict {
    pub fn new(
        source: impl Into<String>,
        approved: bool,
        issues: Vec<String>,
        severity: Severity,
        confidence_hint: Option<u8>,
    ) -> Self {
        Self {
            source: source.into(),
            approved: approved && severity != Severity::Critical,
            issues,
            severity,
            confidence_hint: confidence_hint.map(|c| c.min(100)),
        }
    }

    /// Rejection produced when an evaluator gave no usable answer.
    ///
    /// Covers unparseable responses, transport failures and timeouts alike.
    pub fn unresolved(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            source,
            false,
            vec![reason.into()],
            Severity::Critical,
            Some(ANALYSIS_FAILED),
        )
    }

    /// Replace the severity, re-applying the critical-means-rejected rule.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        if severity == Severity::Critical {
            self.approved = false;
        }
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// First issue, used for human-readable rejection reasons.
    pub fn primary_issue(&self) -> Option<&str> {
        self.issues.first().map(String::as_str)
    }
}

/// Pipeline stage identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    StaticAnalysis,
    JudgePool,
    SecurityGate,
    DeepVerification,
    Arbiter,
}

impl StageName {
    pub fn label(self) -> &'static str {
        match self {
            StageName::StaticAnalysis => "static_analysis",
            StageName::JudgePool => "judge_pool",
            StageName::SecurityGate => "security_gate",
            StageName::DeepVerification => "deep_verification",
            StageName::Arbiter => "arbiter",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the pipeline trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: StageName,

    /// Wall-clock time spent in the stage
    #[serde(rename = "elapsed_ms", with = "duration_millis")]
    pub elapsed: Duration,

    pub skipped: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// One verdict per evaluator (several for the judge pool)
    #[serde(default)]
    pub verdicts: Vec<Verdict>,

    /// Stage-specific facts (approvals, risk score, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl StageResult {
    pub fn completed(stage_name: StageName, elapsed: Duration, verdicts: Vec<Verdict>) -> Self {
        Self {
            stage_name,
            elapsed,
            skipped: false,
            skip_reason: None,
            verdicts,
            metadata: BTreeMap::new(),
        }
    }

    pub fn skipped(stage_name: StageName, elapsed: Duration, reason: impl Into<String>) -> Self {
        Self {
            stage_name,
            elapsed,
            skipped: true,
            skip_reason: Some(reason.into()),
            verdicts: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// The stage's verdict, for single-evaluator stages.
    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdicts.first()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Final artifact handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Ship/no-ship decision
    pub verified: bool,

    /// Aggregate confidence, 0-100
    pub confidence: u8,

    /// Complete trace in execution order
    pub stages: Vec<StageResult>,

    /// Present only when `verified` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    pub evaluated_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn accepted(confidence: u8, stages: Vec<StageResult>) -> Self {
        Self {
            verified: true,
            confidence: confidence.min(100),
            stages,
            rejection_reason: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn rejected(reason: impl Into<String>, confidence: u8, stages: Vec<StageResult>) -> Self {
        Self {
            verified: false,
            confidence: confidence.min(100),
            stages,
            rejection_reason: Some(reason.into()),
            evaluated_at: Utc::now(),
        }
    }

    /// Look up a stage in the trace.
    pub fn stage(&self, name: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage_name == name)
    }

    pub fn ran_stage(&self, name: StageName) -> bool {
        self.stage(name).map(|s| !s.skipped).unwrap_or(false)
    }
}

/// Aggregated output of the judge pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolOutcome {
    /// One verdict per judge, in judge order
    pub verdicts: Vec<Verdict>,

    pub approvals: usize,

    /// Unanimous in either direction
    pub consensus: bool,

    /// Deduplicated issues across all judges
    pub issues: Vec<String>,
}

impl PoolOutcome {
    pub fn judge_count(&self) -> usize {
        self.verdicts.len()
    }

    pub fn unanimous_approval(&self) -> bool {
        !self.verdicts.is_empty() && self.approvals == self.verdicts.len()
    }

    /// Fraction of judges that approved.
    pub fn approval_ratio(&self) -> f64 {
        if self.verdicts.is_empty() {
            0.0
        } else {
            self.approvals as f64 / self.verdicts.len() as f64
        }
    }
}

/// Output of the deep re-examination stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepReview {
    pub verdict: Verdict,

    /// Disputed issues the verifier judged real
    #[serde(default)]
    pub confirmed_issues: Vec<String>,

    /// Disputed issues the verifier judged to be false positives
    #[serde(default)]
    pub dismissed_issues: Vec<String>,

    /// Problems nobody in the pool raised
    #[serde(default)]
    pub new_issues: Vec<String>,

    /// Verifier could neither confirm nor deny
    #[serde(default)]
    pub ambiguous: bool,

    /// False when the verifier gave no usable answer at all
    #[serde(default)]
    pub completed: bool,
}

impl DeepReview {
    pub fn confirms_approval(&self) -> bool {
        self.completed && self.verdict.approved
    }

    pub fn found_new_issues(&self) -> bool {
        !self.new_issues.is_empty()
    }
}

fn default_judge_count() -> usize {
    DEFAULT_JUDGE_COUNT
}

/// Invocation contract for one verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Candidate artifact
    pub code: String,

    /// Language name as given by the caller ("rust", "py", ...)
    pub language: String,

    /// What the code is supposed to do
    pub description: String,

    #[serde(default)]
    pub context: Option<String>,

    #[serde(default = "default_judge_count")]
    pub judge_count: usize,

    /// Backend identifiers; empty means "use the configured defaults"
    #[serde(default)]
    pub judge_backends: Vec<String>,
}

impl VerificationRequest {
    pub fn new(
        code: impl Into<String>,
        language: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            description: description.into(),
            context: None,
            judge_count: DEFAULT_JUDGE_COUNT,
            judge_backends: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_judge_count(mut self, judge_count: usize) -> Self {
        self.judge_count = judge_count;
        self
    }

    pub fn with_backends(mut self, backends: Vec<String>) -> Self {
        self.judge_backends = backends;
        self
    }
}
