//! Shared test helpers: a provider that replays scripted text replies.

use std::sync::Mutex;

use wizard_core::error::ProviderError;
use wizard_core::message::Message;
use wizard_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` returns the next entry. Once the script runs out
/// the last entry is repeated, so a model that "always calls a tool" is one
/// entry long. Every request is kept for inspection.
pub struct ScriptedProvider {
    script: Vec<Result<String, ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::from_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn from_results(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `reply`.
    pub fn repeating(reply: &str) -> Self {
        Self::new(vec![reply])
    }

    /// Every call fails with a retryable network error.
    pub fn failing() -> Self {
        Self::from_results(vec![Err(ProviderError::Network(
            "connection refused".into(),
        ))])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// The `n`th request received, if any.
    pub fn request(&self, n: usize) -> Option<ProviderRequest> {
        self.requests.lock().ok()?.get(n).cloned()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| ProviderError::Network("poisoned".into()))?;
            requests.push(request);
            requests.len() - 1
        };

        let entry = self
            .script
            .get(n)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::Network("script is empty".into())));

        entry.map(|text| make_text_response(&text))
    }
}

/// Create a plain text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}
