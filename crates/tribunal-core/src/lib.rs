//! # tribunal-core
//!
//! Deterministic stages and shared data model for the tribunal code
//! verification pipeline.
//!
//! This crate never touches the network. It provides:
//! - The verdict and trace types every stage produces
//! - [`StaticAnalyzer`]: syntax, delimiter and structure checks
//! - [`SecurityGate`]: pattern-based risk scoring with a critical veto
//! - Issue deduplication across judges
//! - [`ConfidenceAggregator`]: the fixed-weight 0-100 confidence score
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces the same verdict
//! 2. **Fail-closed**: A critical severity is never recorded as approved
//! 3. **Stateless**: Nothing outlives a single call
//!
//! ## Example
//!
//! ```rust,ignore
//! use tribunal_core::{SecurityGate, StaticAnalyzer};
//!
//! let code = "fn main() { std::process::exit(0) }";
//! let syntax = StaticAnalyzer::new().analyze(code, "rust");
//! let security = SecurityGate::default().scan(code);
//!
//! println!("static approved: {}", syntax.approved);
//! println!("risk score: {}", security.risk_score);
//! ```

pub mod analyzer;
pub mod confidence;
pub mod issues;
pub mod security;
pub mod types;

// Re-export main types at crate root
pub use analyzer::{Language, StaticAnalyzer, STATIC_ANALYZER_SOURCE};
pub use confidence::{ConfidenceAggregator, ConfidenceBreakdown};
pub use issues::dedupe_issues;
pub use security::{
    PatternMatch, PatternRule, PatternTable, PatternTableError, SecurityGate, SecurityScan,
    SECURITY_GATE_SOURCE,
};
pub use types::{
    DeepReview, PipelineResult, PoolOutcome, Severity, StageName, StageResult,
    VerificationRequest, Verdict, ANALYSIS_COMPLETED, ANALYSIS_FAILED, DEFAULT_JUDGE_COUNT,
};
