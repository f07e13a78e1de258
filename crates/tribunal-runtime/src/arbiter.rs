//! Final decision over every earlier stage's findings.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tribunal_core::{Verdict, VerificationRequest};

use crate::backends::ModelBackend;
use crate::judge::JudgeError;
use crate::parser::VerdictParser;
use crate::prompts::{arbiter_prompt, ArbiterEvidence};

/// Evaluator identity recorded on arbiter verdicts.
pub const ARBITER_SOURCE: &str = "arbiter";

/// The only stage allowed to overrule a split judge pool.
///
/// It never sees artifacts that failed static analysis or tripped the
/// security veto; the pipeline ends before reaching it in those cases.
#[derive(Clone)]
pub struct Arbiter {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    timeout: Duration,
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("backend", &self.backend.name())
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Arbiter {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32, timeout: Duration) -> Self {
        Self {
            backend,
            temperature,
            timeout,
        }
    }

    async fn try_decide(
        &self,
        request: &VerificationRequest,
        evidence: &ArbiterEvidence<'_>,
    ) -> Result<Verdict, JudgeError> {
        let prompt = arbiter_prompt(
            &request.code,
            &request.language,
            &request.description,
            request.context.as_deref(),
            evidence,
        );

        let text = tokio::time::timeout(self.timeout, self.backend.complete(&prompt, self.temperature))
            .await
            .map_err(|_| JudgeError::Timeout(self.timeout))??;

        Ok(VerdictParser::parse(&text, ARBITER_SOURCE)?)
    }

    /// Decide. Never fails: an unusable answer is a critical rejection.
    pub async fn decide(
        &self,
        request: &VerificationRequest,
        evidence: &ArbiterEvidence<'_>,
    ) -> Verdict {
        match self.try_decide(request, evidence).await {
            Ok(verdict) => {
                info!(
                    backend = self.backend.name(),
                    approved = verdict.approved,
                    confidence = ?verdict.confidence_hint,
                    "Arbiter decision"
                );
                verdict
            }
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    error = %e,
                    "Arbiter failed, counting as rejection"
                );
                Verdict::unresolved(
                    ARBITER_SOURCE,
                    format!("arbiter gave no usable verdict: {}", e),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;
    use tribunal_core::{SecurityGate, Severity};

    async fn decide_with(reply: &str) -> (Verdict, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::always("b", reply));
        let arbiter = Arbiter::new(backend.clone(), 0.0, Duration::from_secs(60));

        let request = VerificationRequest::new("print('hi')", "python", "greet");
        let static_verdict = Verdict::new("static-analyzer", true, vec![], Severity::None, Some(100));
        let judges = vec![Verdict::new("judge-1", true, vec![], Severity::None, Some(90))];
        let security = SecurityGate::default().scan(&request.code);
        let evidence = ArbiterEvidence {
            static_analysis: &static_verdict,
            judges: &judges,
            security: &security,
            deep: None,
        };

        (arbiter.decide(&request, &evidence).await, backend)
    }

    #[tokio::test]
    async fn test_approval_with_confidence() {
        let (verdict, backend) =
            decide_with(r#"Decision: {"approved": true, "issues": [], "confidence": 96}"#).await;
        assert!(verdict.approved);
        assert_eq!(verdict.source, ARBITER_SOURCE);
        assert_eq!(verdict.confidence_hint, Some(96));
        assert!(backend.prompts()[0].contains("Reviewers (1/1 approved)"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_rejects() {
        let (verdict, _) = decide_with("I approve wholeheartedly.").await;
        assert!(!verdict.approved);
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.primary_issue().unwrap().starts_with("arbiter gave no usable verdict"));
    }
}
