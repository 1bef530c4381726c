//! The Weekend Wizard agent loop.
//!
//! The agent follows a **Decide → Act → Observe** cycle:
//!
//! 1. **Decide**: send the conversation to the model and interpret its reply
//!    as a tool call or a final answer ([`decision`])
//! 2. **Act**: validate and dispatch the tool call through the registry
//! 3. **Observe**: append the outcome, success or failure, as a turn
//!    ([`observation`]) and decide again
//! 4. **Conclude**: review the candidate answer once ([`reflection`]) and
//!    return it
//!
//! The loop stops on a final answer or when the loop budget runs out,
//! whichever comes first.

pub mod context;
pub mod decision;
pub mod loop_runner;
pub mod observation;
pub mod reflection;

#[cfg(any(test, feature = "test-util"))]
pub mod test_helpers;

pub use context::{TraceEntry, TraceKind, WorkingMemory};
pub use decision::{Decision, ParseFailure, interpret};
pub use loop_runner::{AgentLoop, AgentOutcome, Termination};
pub use observation::{FailureKind, Observation, Outcome};
pub use reflection::{Reflection, ReflectionVerdict, Reflector};
