//! Resilient invoker: bounded retry with exponential backoff.
//!
//! Every external call the agent makes (model completions, capability
//! dispatches) goes through a [`ResilientInvoker`]. The invoker:
//!
//! 1. runs the operation at most `max_attempts` times, one call per attempt,
//! 2. bounds each attempt by `attempt_timeout` (a timeout counts as retryable),
//! 3. waits `base_delay * backoff_multiplier^(attempt-1)` between attempts,
//!    capped at `max_delay` and optionally jittered,
//! 4. surfaces non-retryable failures immediately,
//! 5. tags the last failure as exhausted once attempts run out.
//!
//! Cancellation is cooperative: a [`CancellationToken`] aborts both a running
//! attempt and a pending backoff sleep.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{DomainEvent, EventBus};

/// Classification of a failure for retry purposes.
pub trait Retryable {
    /// Whether another attempt could plausibly succeed
    /// (timeouts, rate limits, transient server errors).
    fn is_retryable(&self) -> bool;

    /// The error to report when an attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;

    /// The minimum wait the upstream asked for before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// How persistently to retry an external call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (values below 1 behave as 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor applied per further failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
    /// Randomize each delay into `[delay / 2, delay]`.
    pub jitter: bool,
    /// Per-attempt deadline; `None` waits indefinitely.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Defaults for public HTTP APIs: 3 attempts, 1s → 2s backoff, 20s per attempt.
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            jitter: true,
            attempt_timeout: Some(Duration::from_secs(20)),
        }
    }

    /// Defaults for model completions, which are slow but usually local.
    pub fn model() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            jitter: true,
            attempt_timeout: Some(Duration::from_secs(120)),
        }
    }

    /// Set the attempt count.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Un-jittered delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        half + half.mul_f64(rand::thread_rng().r#gen::<f64>())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::network()
    }
}

/// Why an invoked operation ultimately failed.
#[derive(Debug, Error)]
pub enum InvokeError<E> {
    /// The failure was not retryable and was surfaced as-is.
    #[error("{error}")]
    Fatal { error: E, attempts: u32 },

    /// Every attempt failed with a retryable error; `error` is the last one.
    #[error("gave up after {attempts} attempts: {error}")]
    Exhausted { error: E, attempts: u32 },

    /// The caller cancelled the invocation.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> InvokeError<E> {
    /// Number of attempts that were started.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// The underlying error, if the invocation was not cancelled.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }
}

enum AttemptOutcome<T, E> {
    Finished(Result<T, E>),
    TimedOut(Duration),
    Cancelled,
}

/// Wraps external calls with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
    operation: String,
    events: Option<Arc<EventBus>>,
}

impl ResilientInvoker {
    /// Create an invoker with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            operation: "external call".into(),
            events: None,
        }
    }

    /// Publish a [`DomainEvent::RetryScheduled`] before every backoff.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Name the wrapped operation in log output.
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// The policy this invoker applies.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` under the policy, without external cancellation.
    pub async fn invoke<T, E, F, Fut>(&self, op: F) -> Result<T, InvokeError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.invoke_until(&CancellationToken::new(), op).await
    }

    /// Run `op` under the policy until it succeeds, fails fatally, runs out of
    /// attempts, or `cancel` fires.
    pub async fn invoke_until<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, InvokeError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.invoke_with(cancel, op, E::is_retryable).await
    }

    /// Like [`invoke_until`](Self::invoke_until) with an explicit
    /// retryable-failure predicate instead of the error's own classification.
    pub async fn invoke_with<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        is_retryable: P,
    ) -> Result<T, InvokeError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(InvokeError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let fut = op();
            let outcome = match self.policy.attempt_timeout {
                Some(limit) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => AttemptOutcome::Cancelled,
                    result = tokio::time::timeout(limit, fut) => match result {
                        Ok(finished) => AttemptOutcome::Finished(finished),
                        Err(_) => AttemptOutcome::TimedOut(limit),
                    },
                },
                None => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => AttemptOutcome::Cancelled,
                    finished = fut => AttemptOutcome::Finished(finished),
                },
            };

            let error = match outcome {
                AttemptOutcome::Finished(Ok(value)) => {
                    if attempt > 1 {
                        debug!(operation = %self.operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                AttemptOutcome::Finished(Err(e)) => e,
                AttemptOutcome::TimedOut(limit) => E::timed_out(limit),
                AttemptOutcome::Cancelled => {
                    return Err(InvokeError::Cancelled { attempts: attempt });
                }
            };

            if !is_retryable(&error) {
                debug!(operation = %self.operation, attempt, error = %error, "Non-retryable failure");
                return Err(InvokeError::Fatal {
                    error,
                    attempts: attempt,
                });
            }

            if attempt >= max_attempts {
                warn!(
                    operation = %self.operation,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(InvokeError::Exhausted {
                    error,
                    attempts: attempt,
                });
            }

            // Honour the upstream's hint, within the policy's cap.
            let delay = match error.retry_after() {
                Some(hint) => self.policy.delay_for(attempt).max(hint.min(self.policy.max_delay)),
                None => self.policy.delay_for(attempt),
            };
            warn!(
                operation = %self.operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable failure, backing off"
            );
            if let Some(events) = &self.events {
                events.publish(DomainEvent::RetryScheduled {
                    operation: self.operation.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: error.to_string(),
                    timestamp: Utc::now(),
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(InvokeError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for ResilientInvoker {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq, Error)]
    enum FakeError {
        #[error("flaky")]
        Flaky,
        #[error("broken")]
        Broken,
        #[error("timed out")]
        TimedOut,
        #[error("slow down for {0}s")]
        Throttled(u64),
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Flaky | Self::TimedOut | Self::Throttled(_))
        }

        fn timed_out(_after: Duration) -> Self {
            Self::TimedOut
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                Self::Throttled(secs) => Some(Duration::from_secs(*secs)),
                _ => None,
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: false,
            attempt_timeout: Some(Duration::from_secs(1)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let invoker = ResilientInvoker::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<&str, InvokeError<FakeError>> = invoker
            .invoke(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err(FakeError::Flaky) } else { Ok("sunny") } }
            })
            .await;

        assert_eq!(result.unwrap(), "sunny");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let invoker = ResilientInvoker::new(fast_policy(5));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), InvokeError<FakeError>> = invoker
            .invoke(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Broken) }
            })
            .await;

        match result.unwrap_err() {
            InvokeError::Fatal { error, attempts } => {
                assert_eq!(error, FakeError::Broken);
                assert_eq!(attempts, 1);
            }
            other => panic!("Expected Fatal, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_failure() {
        let invoker = ResilientInvoker::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), InvokeError<FakeError>> = invoker
            .invoke(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Flaky) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, InvokeError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(err.into_inner(), Some(FakeError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_between_attempts() {
        let invoker = ResilientInvoker::new(fast_policy(3));
        let start = tokio::time::Instant::now();

        let _: Result<(), InvokeError<FakeError>> =
            invoker.invoke(|| async { Err(FakeError::Flaky) }).await;

        // 100ms after the first failure, 200ms after the second, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_wait_hint_stretches_the_backoff() {
        let invoker = ResilientInvoker::new(fast_policy(2));
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let counter = calls.clone();
        let result: Result<&str, InvokeError<FakeError>> = invoker
            .invoke(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n == 1 { Err(FakeError::Throttled(5)) } else { Ok("question") } }
            })
            .await;

        assert_eq!(result.unwrap(), "question");
        // 5s asked for, not the 100ms base delay.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_hint_is_capped_by_max_delay() {
        let invoker = ResilientInvoker::new(fast_policy(2));
        let start = tokio::time::Instant::now();

        let _: Result<(), InvokeError<FakeError>> =
            invoker.invoke(|| async { Err(FakeError::Throttled(3600)) }).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_and_retries() {
        let invoker = ResilientInvoker::new(fast_policy(2));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), InvokeError<FakeError>> = invoker
            .invoke(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            })
            .await;

        match result.unwrap_err() {
            InvokeError::Exhausted { error, attempts } => {
                assert_eq!(error, FakeError::TimedOut);
                assert_eq!(attempts, 2);
            }
            other => panic!("Expected Exhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_first_attempt() {
        let invoker = ResilientInvoker::new(fast_policy(3));
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), InvokeError<FakeError>> = invoker
            .invoke_until(&token, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(InvokeError::Cancelled { attempts: 0 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_predicate_overrides_classification() {
        let invoker = ResilientInvoker::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), InvokeError<FakeError>> = invoker
            .invoke_with(
                &CancellationToken::new(),
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(FakeError::Flaky) }
                },
                |_| false,
            )
            .await;

        assert!(matches!(result, Err(InvokeError::Fatal { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let invoker = ResilientInvoker::new(fast_policy(2))
            .named("model")
            .with_events(bus.clone());

        let _: Result<(), InvokeError<FakeError>> =
            invoker.invoke(|| async { Err(FakeError::Flaky) }).await;

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::RetryScheduled {
                operation,
                attempt,
                delay_ms,
                reason,
                ..
            } => {
                assert_eq!(operation, "model");
                assert_eq!(*attempt, 1);
                assert_eq!(*delay_ms, 100);
                assert_eq!(reason, "flaky");
            }
            other => panic!("Expected RetryScheduled, got {other:?}"),
        }
        // Only one backoff happens between two attempts.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(350),
            ..fast_policy(5)
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = fast_policy(3).with_jitter(true);
        for _ in 0..50 {
            let d = policy.delay_for(2);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }
}
