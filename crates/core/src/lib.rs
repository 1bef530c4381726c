//! # Weekend Wizard Core
//!
//! Domain types, traits, and error definitions for the Weekend Wizard agent.
//! This crate has **no I/O of its own**: it defines the domain model that
//! the provider, tool, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external boundary is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping model backends via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod retry;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use retry::{InvokeError, ResilientInvoker, RetryPolicy, Retryable};
pub use tool::{ArgSchema, ParamSpec, ParamType, Tool, ToolArgs, ToolCall, ToolRegistry};
