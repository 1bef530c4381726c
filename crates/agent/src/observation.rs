//! Observations: the recorded result of one capability dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wizard_core::error::ToolError;

/// Why a dispatch produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The name is not in the registry
    UnknownCapability,
    /// Arguments failed schema validation; nothing was called
    InvalidArguments,
    /// A retryable failure surfaced without being retried to exhaustion
    Transient,
    /// Retryable failures persisted through every attempt
    RetriesExhausted,
    /// The capability failed in a way retrying cannot fix
    Fatal,
    /// Identical to a call that already failed; not dispatched again
    AlreadyTried,
    /// The invocation was cancelled mid-dispatch
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownCapability => "unknown capability",
            Self::InvalidArguments => "invalid arguments",
            Self::Transient => "temporary failure",
            Self::RetriesExhausted => "retries exhausted",
            Self::Fatal => "failed",
            Self::AlreadyTried => "already tried",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<&ToolError> for FailureKind {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::NotFound(_) => Self::UnknownCapability,
            ToolError::InvalidArguments { .. } => Self::InvalidArguments,
            ToolError::RateLimited { .. } | ToolError::Transient { .. } | ToolError::Timeout { .. } => {
                Self::Transient
            }
            ToolError::RetriesExhausted { .. } => Self::RetriesExhausted,
            ToolError::ExecutionFailed { .. } | ToolError::Upstream { .. } => Self::Fatal,
            ToolError::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { value: Value },
    Failure { kind: FailureKind, reason: String },
}

/// One dispatch and what came of it. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tool: String,
    pub arguments: Map<String, Value>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn success(tool: impl Into<String>, arguments: Map<String, Value>, value: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            outcome: Outcome::Success { value },
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        tool: impl Into<String>,
        arguments: Map<String, Value>,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            outcome: Outcome::Failure {
                kind,
                reason: reason.into(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Build from a dispatch result.
    pub fn from_dispatch(
        tool: impl Into<String>,
        arguments: Map<String, Value>,
        result: Result<Value, ToolError>,
    ) -> Self {
        match result {
            Ok(value) => Self::success(tool, arguments, value),
            Err(e) => Self::failure(tool, arguments, FailureKind::from(&e), e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            Outcome::Failure { kind, .. } => Some(*kind),
            Outcome::Success { .. } => None,
        }
    }

    /// The turn the model sees.
    pub fn render(&self) -> String {
        match &self.outcome {
            Outcome::Success { value } => format!("Result of {}: {}", self.tool, value),
            Outcome::Failure { kind, reason } => format!(
                "Result of {}: FAILED ({}): {}",
                self.tool,
                kind.as_str(),
                reason
            ),
        }
    }
}
