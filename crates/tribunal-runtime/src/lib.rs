//! # tribunal-runtime
//!
//! Model-backed stages and orchestration for tribunal.
//!
//! Everything that talks to an inference service lives here: judges, the
//! judge pool, the deep verifier and the arbiter, all reached through the
//! [`ModelBackend`] capability. The deterministic stages come from
//! `tribunal-core`.
//!
//! ## Failure Policy
//!
//! A stage that cannot get a usable answer rejects. Timeouts, transport
//! errors and unparseable responses all become critical rejection
//! verdicts; none of them escape [`Pipeline::run`] once a run has
//! started.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tribunal_core::VerificationRequest;
//! use tribunal_runtime::{BackendRegistry, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_yaml_file("tribunal.yaml")?;
//! let pipeline = Pipeline::from_config(config, &BackendRegistry::with_defaults())?;
//!
//! let request = VerificationRequest::new(code, "rust", "parse a config file");
//! let result = pipeline.run(request).await?;
//! println!("verified: {} ({}%)", result.verified, result.confidence);
//! ```

pub mod arbiter;
pub mod backends;
pub mod config;
pub mod deep;
pub mod judge;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod prompts;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root
pub use arbiter::{Arbiter, ARBITER_SOURCE};
pub use backends::{
    ApiCredential, BackendError, BackendFactory, BackendRegistry, ModelBackend, RetryBackend,
};
pub use config::{
    BackendSpec, ConfigError, PipelineConfig, SecurityConfig, Temperatures, Thresholds, Timeouts,
    MAJORITY_REJECT_AT_OR_BELOW,
};
pub use deep::{DeepVerifier, DEEP_VERIFIER_SOURCE};
pub use judge::{Judge, JudgeError};
pub use parser::{ParseFailure, VerdictParser};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, PipelineState, TIMEOUT_REASON};
pub use pool::JudgePool;
pub use prompts::ArbiterEvidence;
