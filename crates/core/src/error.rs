//! Error types for the Weekend Wizard domain.
//!
//! Each bounded context has its own error type, and every external
//! failure can be classified as retryable or fatal (see [`crate::retry::Retryable`]).

use std::time::Duration;

use thiserror::Error;

use crate::retry::Retryable;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout(format!("no completion within {}ms", after.as_millis()))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } if *retry_after_secs > 0 => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Failures of a capability dispatch.
///
/// The variants line up with the agent's failure taxonomy:
/// `NotFound` is an unknown capability, `InvalidArguments` never reaches the
/// network, `RateLimited` / `Transient` / `Timeout` are retried, and
/// `RetriesExhausted` tags whatever was still failing after the last attempt.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown capability: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} was rate limited by its upstream API")]
    RateLimited {
        tool_name: String,
        /// Seconds the upstream asked us to wait, when it said
        retry_after_secs: Option<u64>,
    },

    #[error("Transient failure in {tool_name}: {reason}")]
    Transient { tool_name: String, reason: String },

    #[error("{tool_name} upstream returned HTTP {status}: {reason}")]
    Upstream {
        tool_name: String,
        status: u16,
        reason: String,
    },

    #[error("Tool call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{tool_name} gave up after {attempts} attempts: {reason}")]
    RetriesExhausted {
        tool_name: String,
        attempts: u32,
        reason: String,
    },

    #[error("Tool call cancelled")]
    Cancelled,
}

impl ToolError {
    /// Shorthand used by capability implementations for argument problems
    /// that slip past schema validation (e.g. out-of-range coordinates).
    pub fn invalid(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}

impl Retryable for ToolError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transient { .. } | Self::Timeout { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::NotFound(_)
            | Self::InvalidArguments { .. }
            | Self::ExecutionFailed { .. }
            | Self::RetriesExhausted { .. }
            | Self::Cancelled => false,
        }
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: after.as_millis() as u64,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}
