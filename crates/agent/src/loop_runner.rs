//! The agent reasoning loop implementation.
//!
//! An explicit state machine:
//!
//! ```text
//! Deciding → Acting → Observing → Deciding ...
//!     ↓                                ↓
//! Concluding → Reflecting → Done   BudgetExhausted → Done
//! ```
//!
//! The iteration counter is checked at the top of `Deciding`, so an
//! invocation makes at most `max_steps` decisions whatever the model says.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wizard_config::AppConfig;
use wizard_core::error::{ProviderError, ToolError};
use wizard_core::event::{DomainEvent, EventBus};
use wizard_core::message::{Conversation, Message};
use wizard_core::provider::{Provider, ProviderRequest};
use wizard_core::retry::{InvokeError, ResilientInvoker, RetryPolicy};
use wizard_core::tool::{ToolCall, ToolRegistry};

use crate::context::prompt;
use crate::context::working_memory::{TraceEntry, WorkingMemory};
use crate::decision::{self, Decision};
use crate::observation::{FailureKind, Observation, Outcome};
use crate::reflection::{ReflectionVerdict, Reflector};

/// Why an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model produced a final answer
    FinalAnswer,
    /// The model's output could not be read, even after a re-prompt
    ParseFailure,
    /// The loop budget ran out
    BudgetExhausted,
    /// The model kept re-issuing a call that had already failed
    RepeatedFailure,
    /// The model could not be reached mid-run
    ModelUnavailable,
    Cancelled,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinalAnswer => "final_answer",
            Self::ParseFailure => "parse_failure",
            Self::BudgetExhausted => "budget_exhausted",
            Self::RepeatedFailure => "repeated_failure",
            Self::ModelUnavailable => "model_unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only answers the model had a hand in are reviewed.
    fn reflects(self) -> bool {
        matches!(self, Self::FinalAnswer | Self::ParseFailure)
    }
}

/// The result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The answer to show the user.
    pub answer: String,
    pub termination: Termination,
    /// Decide/act iterations used.
    pub iterations: u32,
    /// Dispatches that reached the registry.
    pub tool_calls_made: u32,
    /// Every observation, in call order.
    pub observations: Vec<Observation>,
    /// Complete reasoning trace.
    pub trace: Vec<TraceEntry>,
    pub reflection: ReflectionVerdict,
    /// Everything the model saw.
    pub conversation: Conversation,
}

/// Loop states. Data needed by the next step travels with the state.
#[derive(Debug)]
enum State {
    Deciding,
    Acting(ToolCall),
    Observing {
        signature: String,
        observation: Observation,
    },
    Concluding {
        candidate: String,
        termination: Termination,
    },
    Reflecting {
        candidate: String,
        termination: Termination,
    },
    BudgetExhausted,
    Done {
        answer: String,
        termination: Termination,
        verdict: ReflectionVerdict,
    },
}

/// The core agent loop that orchestrates model calls and tool dispatch.
pub struct AgentLoop {
    /// The model provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature for decisions
    temperature: f32,

    /// Max tokens per model reply
    max_tokens: Option<u32>,

    /// Tool registry, shared read-only across invocations
    tools: Arc<ToolRegistry>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Loop budget per invocation
    max_steps: u32,

    /// Retry policy around model calls
    model_invoker: ResilientInvoker,

    reflection: bool,
    reflection_temperature: f32,

    /// Repeats of an already-failed call tolerated before giving up; 0 disables
    repeat_failure_limit: u32,
}

impl AgentLoop {
    /// Create a new agent loop with default settings.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let model_invoker = ResilientInvoker::new(RetryPolicy::model())
            .named("model completion")
            .with_events(event_bus.clone());
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: Some(1024),
            tools,
            event_bus,
            max_steps: 8,
            model_invoker,
            reflection: true,
            reflection_temperature: 0.0,
            repeat_failure_limit: 2,
        }
    }

    /// Build from the startup configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let invoker =
            ResilientInvoker::new(config.model_retry.to_policy()).with_events(event_bus.clone());
        Self::new(provider, &config.model, tools, event_bus)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_max_steps(config.agent.max_steps)
            .with_model_invoker(invoker)
            .with_reflection(config.agent.reflection)
            .with_reflection_temperature(config.agent.reflection_temperature)
            .with_repeat_failure_limit(config.agent.repeat_failure_limit)
    }

    /// Set the loop budget.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per model reply.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Replace the retry policy around model calls.
    pub fn with_model_invoker(mut self, invoker: ResilientInvoker) -> Self {
        self.model_invoker = invoker.named("model completion");
        self
    }

    /// Enable or disable the reflection pass.
    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.reflection = enabled;
        self
    }

    pub fn with_reflection_temperature(mut self, temperature: f32) -> Self {
        self.reflection_temperature = temperature;
        self
    }

    pub fn with_repeat_failure_limit(mut self, limit: u32) -> Self {
        self.repeat_failure_limit = limit;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one request.
    pub async fn run(&self, request: &str) -> AgentOutcome {
        self.run_until(request, &CancellationToken::new()).await
    }

    /// Answer one request, stopping early if `cancel` fires.
    ///
    /// Never fails: every failure below "no answer at all" is absorbed into
    /// an observation or a fallback answer.
    pub async fn run_until(&self, request: &str, cancel: &CancellationToken) -> AgentOutcome {
        let started = Instant::now();
        let mut conversation = Conversation::new();
        conversation.push(Message::system(prompt::system_prompt(&self.tools)));
        conversation.push(Message::user(request));
        let mut wm = WorkingMemory::new(self.max_steps);

        info!(
            conversation_id = %conversation.id,
            max_steps = self.max_steps,
            "Processing request"
        );
        self.event_bus.publish(DomainEvent::InvocationStarted {
            conversation_id: conversation.id.to_string(),
            request_preview: request.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let mut state = State::Deciding;
        let (answer, termination, verdict) = loop {
            debug!(iteration = wm.iterations, state = state_name(&state), "Agent loop step");
            state = match state {
                State::Deciding => self.decide(&mut conversation, &mut wm, cancel).await,
                State::Acting(call) => self.act(call, &mut wm, cancel).await,
                State::Observing {
                    signature,
                    observation,
                } => self.observe(signature, observation, &mut conversation, &mut wm),
                State::Concluding {
                    candidate,
                    termination,
                } => {
                    if self.reflection && termination.reflects() && !cancel.is_cancelled() {
                        State::Reflecting {
                            candidate,
                            termination,
                        }
                    } else {
                        State::Done {
                            answer: candidate,
                            termination,
                            verdict: ReflectionVerdict::Skipped,
                        }
                    }
                }
                State::Reflecting {
                    candidate,
                    termination,
                } => {
                    let reflector = Reflector::new(self.provider.clone(), &self.model)
                        .with_temperature(self.reflection_temperature)
                        .with_max_tokens(self.max_tokens)
                        .with_invoker(self.model_invoker.clone());
                    let reflection = reflector
                        .reflect(request, &candidate, &wm.observations, cancel)
                        .await;
                    wm.add_reflection(reflection.verdict.as_str());
                    self.event_bus.publish(DomainEvent::ReflectionCompleted {
                        verdict: reflection.verdict.as_str().to_string(),
                        timestamp: Utc::now(),
                    });
                    State::Done {
                        answer: reflection.answer,
                        termination,
                        verdict: reflection.verdict,
                    }
                }
                State::BudgetExhausted => {
                    warn!(
                        conversation_id = %conversation.id,
                        max_steps = self.max_steps,
                        "Loop budget exhausted, concluding with gathered data"
                    );
                    self.event_bus.publish(DomainEvent::BudgetExhausted {
                        max_steps: self.max_steps,
                        timestamp: Utc::now(),
                    });
                    State::Done {
                        answer: fallback_answer(
                            "I reached the step limit before finishing.",
                            &wm,
                            "Please try a simpler or more specific prompt.",
                        ),
                        termination: Termination::BudgetExhausted,
                        verdict: ReflectionVerdict::Skipped,
                    }
                }
                State::Done {
                    answer,
                    termination,
                    verdict,
                } => break (answer, termination, verdict),
            };
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            conversation_id = %conversation.id,
            termination = termination.as_str(),
            reflection = verdict.as_str(),
            summary = %wm.summarize(),
            duration_ms,
            "Request finished"
        );
        debug!(conversation_id = %conversation.id, "Working memory:\n{}", wm.render());
        self.event_bus.publish(DomainEvent::InvocationFinished {
            termination: termination.as_str().to_string(),
            iterations: wm.iterations,
            tool_calls: wm.tool_calls(),
            duration_ms,
            timestamp: Utc::now(),
        });

        AgentOutcome {
            answer,
            termination,
            iterations: wm.iterations,
            tool_calls_made: wm.tool_calls(),
            observations: wm.observations,
            trace: wm.trace,
            reflection: verdict,
            conversation,
        }
    }

    /// Deciding: consult the model and interpret its reply. A reply that
    /// can't be read earns exactly one clarification re-prompt.
    async fn decide(
        &self,
        conversation: &mut Conversation,
        wm: &mut WorkingMemory,
        cancel: &CancellationToken,
    ) -> State {
        if cancel.is_cancelled() {
            return cancelled(wm);
        }
        if !wm.tick() {
            return State::BudgetExhausted;
        }
        let iteration = wm.iterations;

        let mut reprompted = false;
        loop {
            let raw = match self.consult(conversation, cancel).await {
                Ok(raw) => raw,
                Err(InvokeError::Cancelled { .. }) => return cancelled(wm),
                Err(e) => {
                    let reason = e.into_inner().map(|e| e.to_string()).unwrap_or_default();
                    warn!(iteration, %reason, "Model unavailable, concluding");
                    return State::Concluding {
                        candidate: fallback_answer(
                            &format!("I couldn't reach the language model ({reason})."),
                            wm,
                            "Please check that the model server is running and try again.",
                        ),
                        termination: Termination::ModelUnavailable,
                    };
                }
            };
            wm.add_thought(&raw);
            conversation.push(Message::assistant(&raw));

            match decision::parse(&raw) {
                Ok(parsed) => {
                    if parsed.repaired {
                        debug!(iteration, "Model output repaired");
                        self.event_bus.publish(DomainEvent::ParseRepaired {
                            iteration,
                            timestamp: Utc::now(),
                        });
                    }
                    self.event_bus.publish(DomainEvent::DecisionMade {
                        iteration,
                        decision: parsed.decision.label().to_string(),
                        timestamp: Utc::now(),
                    });
                    return match parsed.decision {
                        Decision::ToolCall(call) => State::Acting(call),
                        Decision::FinalAnswer { text } => State::Concluding {
                            candidate: text,
                            termination: Termination::FinalAnswer,
                        },
                    };
                }
                Err(failure) => {
                    self.event_bus.publish(DomainEvent::ParseFailed {
                        iteration,
                        reprompted: !reprompted,
                        timestamp: Utc::now(),
                    });
                    if reprompted {
                        warn!(iteration, reason = %failure.reason, "Model output unreadable after re-prompt");
                        return State::Concluding {
                            candidate: format!(
                                "Sorry, I couldn't understand the model's reply ({}). Its last reply was:\n{}",
                                failure.reason, failure.raw
                            ),
                            termination: Termination::ParseFailure,
                        };
                    }
                    debug!(iteration, reason = %failure.reason, "Re-prompting for a readable reply");
                    conversation.push(Message::user(prompt::clarification(&failure.reason)));
                    reprompted = true;
                }
            }
        }
    }

    /// Acting: dispatch the call, or refuse it if it already failed.
    async fn act(&self, call: ToolCall, wm: &mut WorkingMemory, cancel: &CancellationToken) -> State {
        let signature = call.signature();
        wm.add_action(&signature);

        if wm.has_failed(&signature) {
            wm.repeated_failures += 1;
            debug!(tool = %call.name, repeats = wm.repeated_failures, "Refusing repeated failing call");
            let observation = Observation::failure(
                call.name,
                call.arguments,
                FailureKind::AlreadyTried,
                prompt::ALREADY_TRIED,
            );
            return State::Observing {
                signature,
                observation,
            };
        }

        let known = self.tools.resolve(&call.name).is_ok();
        let started = Instant::now();
        let result = self.tools.dispatch_until(&call, cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => debug!(tool = %call.name, duration_ms, "Tool succeeded"),
            Err(e) => warn!(tool = %call.name, duration_ms, error = %e, "Tool failed"),
        }
        self.event_bus.publish(DomainEvent::ToolDispatched {
            tool_name: call.name.clone(),
            success: result.is_ok(),
            known,
            duration_ms,
            timestamp: Utc::now(),
        });

        let observation = match result {
            Err(ToolError::NotFound(name)) => Observation::failure(
                name.clone(),
                call.arguments,
                FailureKind::UnknownCapability,
                format!(
                    "Tool '{name}' does not exist. {}",
                    prompt::unknown_capability_hint(&self.tools)
                ),
            ),
            other => Observation::from_dispatch(call.name, call.arguments, other),
        };
        State::Observing {
            signature,
            observation,
        }
    }

    /// Observing: append the observation as a turn, then decide again.
    fn observe(
        &self,
        signature: String,
        observation: Observation,
        conversation: &mut Conversation,
        wm: &mut WorkingMemory,
    ) -> State {
        let kind = observation.failure_kind();
        conversation.push(Message::observation(observation.render()));
        wm.record(&signature, observation);

        match kind {
            Some(FailureKind::Cancelled) => cancelled(wm),
            Some(FailureKind::AlreadyTried)
                if self.repeat_failure_limit > 0
                    && wm.repeated_failures >= self.repeat_failure_limit =>
            {
                warn!(
                    repeats = wm.repeated_failures,
                    "Model keeps repeating a failing call, concluding"
                );
                State::Concluding {
                    candidate: fallback_answer(
                        "I kept running into the same failing request, so I stopped there.",
                        wm,
                        "Please rephrase the request or try again later.",
                    ),
                    termination: Termination::RepeatedFailure,
                }
            }
            _ => State::Deciding,
        }
    }

    /// One model completion under the model retry policy.
    async fn consult(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<String, InvokeError<ProviderError>> {
        let request = ProviderRequest::new(&self.model, conversation.messages().to_vec())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self
            .model_invoker
            .invoke_until(cancel, || self.provider.complete(request.clone()))
            .await?;
        Ok(response.message.content.trim().to_string())
    }
}

fn cancelled(wm: &WorkingMemory) -> State {
    State::Concluding {
        candidate: fallback_answer("Cancelled before an answer was ready.", wm, ""),
        termination: Termination::Cancelled,
    }
}

/// `headline`, then every successful observation, or `when_empty`.
fn fallback_answer(headline: &str, wm: &WorkingMemory, when_empty: &str) -> String {
    let gathered: Vec<String> = wm
        .observations
        .iter()
        .filter_map(|o| match &o.outcome {
            Outcome::Success { value } => Some(format!("- {}: {}", o.tool, value)),
            Outcome::Failure { .. } => None,
        })
        .collect();

    if gathered.is_empty() {
        if when_empty.is_empty() {
            headline.to_string()
        } else {
            format!("{headline} {when_empty}")
        }
    } else {
        format!("{headline} Here is what I found:\n{}", gathered.join("\n"))
    }
}

fn state_name(state: &State) -> &'static str {
    match state {
        State::Deciding => "deciding",
        State::Acting(_) => "acting",
        State::Observing { .. } => "observing",
        State::Concluding { .. } => "concluding",
        State::Reflecting { .. } => "reflecting",
        State::BudgetExhausted => "budget_exhausted",
        State::Done { .. } => "done",
    }
}
