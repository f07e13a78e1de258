//! Focused re-examination of a disputed judge pool.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tribunal_core::{DeepReview, Verdict, VerificationRequest};

use crate::backends::ModelBackend;
use crate::judge::JudgeError;
use crate::parser::VerdictParser;
use crate::prompts::deep_verification_prompt;

/// Evaluator identity recorded on deep verification verdicts.
pub const DEEP_VERIFIER_SOURCE: &str = "deep-verifier";

/// Asks a stronger pass to confirm or dismiss the dissenting judges' issues.
#[derive(Clone)]
pub struct DeepVerifier {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    timeout: Duration,
}

impl std::fmt::Debug for DeepVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepVerifier")
            .field("backend", &self.backend.name())
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DeepVerifier {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32, timeout: Duration) -> Self {
        Self {
            backend,
            temperature,
            timeout,
        }
    }

    async fn try_reexamine(
        &self,
        request: &VerificationRequest,
        disputed_issues: &[String],
    ) -> Result<DeepReview, JudgeError> {
        let prompt = deep_verification_prompt(
            &request.code,
            &request.language,
            &request.description,
            request.context.as_deref(),
            disputed_issues,
        );

        let text = tokio::time::timeout(self.timeout, self.backend.complete(&prompt, self.temperature))
            .await
            .map_err(|_| JudgeError::Timeout(self.timeout))??;

        Ok(VerdictParser::parse_review(&text, DEEP_VERIFIER_SOURCE)?)
    }

    /// Re-examine the disputed issues. Never fails: an unusable answer is
    /// an incomplete, rejecting review.
    pub async fn reexamine(
        &self,
        request: &VerificationRequest,
        disputed_issues: &[String],
    ) -> DeepReview {
        match self.try_reexamine(request, disputed_issues).await {
            Ok(review) => {
                info!(
                    backend = self.backend.name(),
                    approved = review.verdict.approved,
                    ambiguous = review.ambiguous,
                    confirmed = review.confirmed_issues.len(),
                    dismissed = review.dismissed_issues.len(),
                    new = review.new_issues.len(),
                    "Deep verification complete"
                );
                review
            }
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    error = %e,
                    "Deep verification failed, counting as rejection"
                );
                DeepReview {
                    verdict: Verdict::unresolved(
                        DEEP_VERIFIER_SOURCE,
                        format!("deep verification gave no usable verdict: {}", e),
                    ),
                    confirmed_issues: Vec::new(),
                    dismissed_issues: Vec::new(),
                    new_issues: Vec::new(),
                    ambiguous: false,
                    completed: false,
                }
            }
        }
    }
}
