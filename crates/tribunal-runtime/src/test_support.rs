//! Scripted backends for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::backends::{BackendError, ModelBackend};

/// Replies from a fixed script, then repeats the last entry forever.
pub(crate) struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    last: Mutex<Result<String, BackendError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn sequence(name: &str, script: Vec<Result<String, BackendError>>) -> Self {
        let last = script
            .last()
            .cloned()
            .unwrap_or_else(|| Err(BackendError::NotConfigured("empty script".into())));
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(name: &str, reply: &str) -> Self {
        Self::sequence(name, vec![Ok(reply.to_string())])
    }

    pub(crate) fn failing(name: &str, error: BackendError) -> Self {
        Self::sequence(name, vec![Err(error)])
    }

    /// Sleep before answering; pair with a paused tokio clock.
    pub(crate) fn slow(name: &str, delay: Duration, reply: &str) -> Self {
        Self {
            delay: Some(delay),
            ..Self::always(name, reply)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None => self.last.lock().unwrap().clone(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A judge reply approving with the given confidence.
pub(crate) fn approve(confidence: u8) -> String {
    format!(
        r#"{{"approved": true, "issues": [], "severity": "none", "confidence": {}}}"#,
        confidence
    )
}

/// A judge reply rejecting with one issue.
pub(crate) fn reject(issue: &str) -> String {
    format!(
        r#"{{"approved": false, "issues": ["{}"], "severity": "high", "confidence": 85}}"#,
        issue
    )
}
