//! Working memory: the scratchpad for a single agent invocation.
//!
//! Holds the reasoning trace (Thought/Action/Observation/Reflection), the
//! observations in call order, the memo of calls that already failed, and
//! the loop budget. Working memory is:
//!
//! - **Invocation-scoped**: created fresh per request, dropped afterwards
//! - **Serializable**: can be exported to JSON for debugging
//! - **Renderable**: produces a text section for debug logs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observation::{FailureKind, Observation};

// ── Data Structures ───────────────────────────────────────────────────────

/// The agent's scratchpad within a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// ReAct reasoning trace entries.
    pub trace: Vec<TraceEntry>,

    /// Every dispatch outcome, in strict call order.
    pub observations: Vec<Observation>,

    /// Signatures of calls that failed non-retryably.
    failed_signatures: HashSet<String>,

    /// How many times the model re-issued a call that had already failed.
    pub repeated_failures: u32,

    /// Decide/act iterations started so far.
    pub iterations: u32,

    /// The loop budget.
    pub max_iterations: u32,
}

/// A single entry in the reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The kind of reasoning trace entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TraceKind {
    Thought,
    Action,
    Observation,
    Reflection,
}

impl TraceKind {
    fn label(self) -> &'static str {
        match self {
            Self::Thought => "Thought",
            Self::Action => "Action",
            Self::Observation => "Observation",
            Self::Reflection => "Reflection",
        }
    }
}

// ── Implementation ────────────────────────────────────────────────────────

impl WorkingMemory {
    /// Create a new empty working memory with the given loop budget.
    pub fn new(max_iterations: u32) -> Self {
        Self {
            trace: Vec::new(),
            observations: Vec::new(),
            failed_signatures: HashSet::new(),
            repeated_failures: 0,
            iterations: 0,
            max_iterations,
        }
    }

    // ── Trace recording ──

    /// Record a "Thought" trace entry (raw model output).
    pub fn add_thought(&mut self, thought: &str) {
        self.push_trace(TraceKind::Thought, thought);
    }

    /// Record an "Action" trace entry.
    pub fn add_action(&mut self, action: &str) {
        self.push_trace(TraceKind::Action, action);
    }

    /// Record a "Reflection" trace entry.
    pub fn add_reflection(&mut self, reflection: &str) {
        self.push_trace(TraceKind::Reflection, reflection);
    }

    fn push_trace(&mut self, kind: TraceKind, content: &str) {
        self.trace.push(TraceEntry {
            kind,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    // ── Observations ──

    /// Append an observation and trace it. `signature` identifies the call so
    /// that a non-retryable failure is remembered.
    pub fn record(&mut self, signature: &str, observation: Observation) {
        if let Some(kind) = observation.failure_kind()
            && remembers(kind)
        {
            self.failed_signatures.insert(signature.to_string());
        }
        self.push_trace(TraceKind::Observation, &observation.render());
        self.observations.push(observation);
    }

    /// Whether an identical call already failed in a way retrying won't fix.
    pub fn has_failed(&self, signature: &str) -> bool {
        self.failed_signatures.contains(signature)
    }

    /// Observations that produced a value.
    pub fn successes(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter().filter(|o| o.is_success())
    }

    /// Number of dispatches that reached the registry (repeats excluded).
    pub fn tool_calls(&self) -> u32 {
        self.observations
            .iter()
            .filter(|o| o.failure_kind() != Some(FailureKind::AlreadyTried))
            .count() as u32
    }

    // ── Iteration tracking ──

    /// Start an iteration. Returns `false` once the budget is spent, without
    /// counting the refused iteration.
    pub fn tick(&mut self) -> bool {
        if self.iterations >= self.max_iterations {
            return false;
        }
        self.iterations += 1;
        true
    }

    // ── Rendering ──

    /// Render working memory as a human-readable text section.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.trace.is_empty() {
            out.push_str("## Reasoning Trace\n");
            for entry in &self.trace {
                out.push_str(&format!("[{}] {}\n", entry.kind.label(), entry.content));
            }
            out.push('\n');
        }

        if !self.observations.is_empty() {
            out.push_str("## Tool Results\n");
            for obs in &self.observations {
                let status = if obs.is_success() { "✓" } else { "✗" };
                out.push_str(&format!("- {} {}\n", status, obs.render()));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "Iterations: {}/{}\n",
            self.iterations, self.max_iterations
        ));

        out
    }

    /// One-line summary for logs.
    pub fn summarize(&self) -> String {
        let success = self.successes().count();
        format!(
            "{} tool calls ({} successful). {} iterations used",
            self.tool_calls(),
            success,
            self.iterations
        )
    }
}

/// Failures worth refusing to repeat. Transient ones may succeed next time.
fn remembers(kind: FailureKind) -> bool {
    matches!(
        kind,
        FailureKind::UnknownCapability | FailureKind::InvalidArguments | FailureKind::Fatal
    )
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new(8)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn new_working_memory_is_empty() {
        let wm = WorkingMemory::new(10);
        assert!(wm.trace.is_empty());
        assert!(wm.observations.is_empty());
        assert_eq!(wm.iterations, 0);
        assert_eq!(wm.max_iterations, 10);
    }

    #[test]
    fn trace_recording() {
        let mut wm = WorkingMemory::default();
        wm.add_thought(r#"{"action":"trivia","args":{}}"#);
        wm.add_action("trivia({})");
        wm.record(
            "trivia({})",
            Observation::success("trivia", Map::new(), json!({"question": "Q?"})),
        );

        assert_eq!(wm.trace.len(), 3);
        assert_eq!(wm.trace[0].kind, TraceKind::Thought);
        assert_eq!(wm.trace[1].kind, TraceKind::Action);
        assert_eq!(wm.trace[2].kind, TraceKind::Observation);
        assert_eq!(wm.observations.len(), 1);
    }

    #[test]
    fn iteration_tracking() {
        let mut wm = WorkingMemory::new(3);
        assert!(wm.tick()); // 1
        assert!(wm.tick()); // 2
        assert!(wm.tick()); // 3
        assert!(!wm.tick());
        assert_eq!(wm.iterations, 3);
    }

    #[test]
    fn zero_budget_refuses_first_tick() {
        let mut wm = WorkingMemory::new(0);
        assert!(!wm.tick());
        assert_eq!(wm.iterations, 0);
    }

    #[test]
    fn non_retryable_failures_are_remembered() {
        let mut wm = WorkingMemory::default();
        wm.record(
            "nonexistent({})",
            Observation::failure("nonexistent", Map::new(), FailureKind::UnknownCapability, "no"),
        );
        wm.record(
            "trivia({})",
            Observation::failure("trivia", Map::new(), FailureKind::Cancelled, "stop"),
        );
        assert!(wm.has_failed("nonexistent({})"));
        assert!(!wm.has_failed("trivia({})"));
    }

    #[test]
    fn already_tried_is_not_a_tool_call() {
        let mut wm = WorkingMemory::default();
        wm.record(
            "x({})",
            Observation::failure("x", Map::new(), FailureKind::UnknownCapability, "no"),
        );
        wm.record(
            "x({})",
            Observation::failure("x", Map::new(), FailureKind::AlreadyTried, "again"),
        );
        assert_eq!(wm.observations.len(), 2);
        assert_eq!(wm.tool_calls(), 1);
    }

    #[test]
    fn render_produces_readable_output() {
        let mut wm = WorkingMemory::default();
        wm.add_thought("Need to check weather");
        wm.add_action("get_weather(latitude=40.7)");
        wm.record(
            "w",
            Observation::success("get_weather", Map::new(), json!({"temperature_c": 18.0})),
        );
        wm.add_reflection("approved");

        let rendered = wm.render();
        assert!(rendered.contains("[Thought]"));
        assert!(rendered.contains("[Action]"));
        assert!(rendered.contains("[Observation]"));
        assert!(rendered.contains("[Reflection]"));
        assert!(rendered.contains("## Tool Results"));
        assert!(rendered.contains("Iterations: 0/8"));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut wm = WorkingMemory::default();
        wm.add_thought("test thought");
        wm.record(
            "bad({})",
            Observation::failure("bad", Map::new(), FailureKind::Fatal, "boom"),
        );

        let json = serde_json::to_string(&wm).unwrap();
        let deserialized: WorkingMemory = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.trace.len(), 2);
        assert!(deserialized.has_failed("bad({})"));
    }

    #[test]
    fn summarize_output() {
        let mut wm = WorkingMemory::default();
        wm.record("a", Observation::success("a", Map::new(), json!(1)));
        wm.record(
            "b",
            Observation::failure("b", Map::new(), FailureKind::Fatal, "x"),
        );
        wm.iterations = 3;

        let summary = wm.summarize();
        assert!(summary.contains("2 tool calls (1 successful)"));
        assert!(summary.contains("3 iterations"));
    }
}
