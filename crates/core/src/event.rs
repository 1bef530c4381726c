//! Domain event system: decoupled progress reporting.
//!
//! The agent loop and the resilient invoker publish events as they work.
//! The CLI subscribes to draw its progress line; tests subscribe to assert
//! on what happened without reaching into the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An agent invocation began
    InvocationStarted {
        conversation_id: String,
        request_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a decision (`"final"` or the tool name)
    DecisionMade {
        iteration: u32,
        decision: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched and finished
    ToolDispatched {
        tool_name: String,
        success: bool,
        /// False when the name was not in the registry
        known: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An external call failed retryably and will be attempted again
    RetryScheduled {
        operation: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Malformed model output was recovered by the repair path
    ParseRepaired {
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// Model output could not be interpreted even after repair
    ParseFailed {
        iteration: u32,
        reprompted: bool,
        timestamp: DateTime<Utc>,
    },

    /// The reflection pass finished (`approved`, `revised`, `failed`, `skipped`)
    ReflectionCompleted {
        verdict: String,
        timestamp: DateTime<Utc>,
    },

    /// The loop budget ran out before a final answer
    BudgetExhausted {
        max_steps: u32,
        timestamp: DateTime<Utc>,
    },

    /// An agent invocation ended
    InvocationFinished {
        termination: String,
        iterations: u32,
        tool_calls: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
