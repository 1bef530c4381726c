//! Reflection pass: one extra model consultation that reviews the candidate
//! answer against the request and the gathered observations.
//!
//! Exactly one consultation, never recursive, never a new tool cycle. If the
//! consultation fails the candidate goes out unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wizard_core::message::Message;
use wizard_core::provider::{Provider, ProviderRequest};
use wizard_core::retry::{InvokeError, ResilientInvoker, RetryPolicy};

use crate::context::prompt;
use crate::decision::{self, Decision};
use crate::observation::Observation;

/// What the reviewer decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum ReflectionVerdict {
    /// Candidate returned unchanged
    Approved,
    /// Candidate replaced by the reviewer's text
    Revised(String),
    /// The review call failed; candidate returned unchanged
    Failed(String),
    /// No review was run
    Skipped,
}

impl ReflectionVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Revised(_) => "revised",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// The answer to show and how it was arrived at.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub answer: String,
    pub verdict: ReflectionVerdict,
}

pub struct Reflector {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    invoker: ResilientInvoker,
}

impl Reflector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: Some(1024),
            invoker: ResilientInvoker::new(RetryPolicy::model()).named("reflection"),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_invoker(mut self, invoker: ResilientInvoker) -> Self {
        self.invoker = invoker.named("reflection");
        self
    }

    /// Review `candidate` once.
    pub async fn reflect(
        &self,
        request: &str,
        candidate: &str,
        observations: &[Observation],
        cancel: &CancellationToken,
    ) -> Reflection {
        let messages = vec![
            Message::system(prompt::REFLECTION_SYSTEM),
            Message::user(prompt::reflection_request(request, candidate, observations)),
        ];
        let req = ProviderRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let result = self
            .invoker
            .invoke_until(cancel, || self.provider.complete(req.clone()))
            .await;

        let verdict = match result {
            Ok(response) => classify(&response.message.content, candidate),
            Err(e) => {
                let reason = match e {
                    InvokeError::Fatal { error, .. } | InvokeError::Exhausted { error, .. } => {
                        error.to_string()
                    }
                    InvokeError::Cancelled { .. } => "cancelled".to_string(),
                };
                warn!(%reason, "Reflection failed, keeping candidate answer");
                ReflectionVerdict::Failed(reason)
            }
        };
        debug!(verdict = verdict.as_str(), "Reflection complete");

        let answer = match &verdict {
            ReflectionVerdict::Revised(text) => text.clone(),
            _ => candidate.to_string(),
        };
        Reflection { answer, verdict }
    }
}

/// Interpret the reviewer's reply.
///
/// Empty or "looks good" (any case, any punctuation) approves. A reply that
/// is itself a final-answer object is unwrapped. Anything else is the
/// revision.
pub fn classify(reply: &str, candidate: &str) -> ReflectionVerdict {
    let reply = reply.trim();
    if reply.is_empty() || is_approval(reply) {
        return ReflectionVerdict::Approved;
    }

    let revised = if reply.starts_with('{') || reply.starts_with("```") {
        match decision::interpret(reply) {
            Ok(Decision::FinalAnswer { text }) => text,
            // A tool request here would start a new cycle.
            Ok(Decision::ToolCall(call)) => {
                return ReflectionVerdict::Failed(format!(
                    "reviewer asked for tool {} instead of reviewing",
                    call.name
                ));
            }
            Err(_) => reply.to_string(),
        }
    } else {
        reply.to_string()
    };

    if revised.trim() == candidate.trim() || is_approval(revised.trim()) {
        ReflectionVerdict::Approved
    } else {
        ReflectionVerdict::Revised(revised)
    }
}

fn is_approval(text: &str) -> bool {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    words == ["looks", "good"]
}
