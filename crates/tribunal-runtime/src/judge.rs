//! A single model-backed judge.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use tribunal_core::{Verdict, VerificationRequest};

use crate::backends::{BackendError, ModelBackend};
use crate::parser::{ParseFailure, VerdictParser};
use crate::prompts::judge_prompt;

/// Why a judge produced no usable verdict.
///
/// Never escapes a stage: [`Judge::evaluate`] turns it into a rejection.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("unparseable response: {0}")]
    Parse(#[from] ParseFailure),
}

/// One independent evaluator bound to a backend.
#[derive(Clone)]
pub struct Judge {
    id: String,
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    timeout: Duration,
}

impl std::fmt::Debug for Judge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Judge")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Judge {
    pub fn new(
        id: impl Into<String>,
        backend: Arc<dyn ModelBackend>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            backend,
            temperature,
            timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Evaluate, surfacing failures as errors.
    pub async fn try_evaluate(&self, request: &VerificationRequest) -> Result<Verdict, JudgeError> {
        let prompt = judge_prompt(
            &request.code,
            &request.language,
            &request.description,
            request.context.as_deref(),
        );

        let text = tokio::time::timeout(self.timeout, self.backend.complete(&prompt, self.temperature))
            .await
            .map_err(|_| JudgeError::Timeout(self.timeout))??;

        Ok(VerdictParser::parse(&text, &self.id)?)
    }

    /// Evaluate; any failure becomes a critical rejection.
    pub async fn evaluate(&self, request: &VerificationRequest) -> Verdict {
        match self.try_evaluate(request).await {
            Ok(verdict) => {
                debug!(
                    judge = %self.id,
                    backend = self.backend.name(),
                    approved = verdict.approved,
                    "Judge verdict"
                );
                verdict
            }
            Err(e) => {
                warn!(
                    judge = %self.id,
                    backend = self.backend.name(),
                    error = %e,
                    "Judge failed, counting as rejection"
                );
                Verdict::unresolved(&self.id, format!("{} gave no usable verdict: {}", self.id, e))
            }
        }
    }
}
