//! Retry policy and backoff state machine
//!
//! [`Backoff`] is a small pure state machine: it counts attempts, produces the
//! next delay and decides when to give up. [`RetryPolicy::run_observed`]
//! drives an async operation through it. Keeping the two apart means the delay
//! schedule can be tested without any network calls.
//!
//! ## Delay schedule
//!
//! The nominal delay before retry `n` (0-based) is `base * 2^n`, capped at
//! `max_delay`. With jitter enabled the actual delay is drawn from
//! `[nominal / 2, nominal]`. A delay is never shorter than the one before it.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (1 = no retries)
    pub max_attempts: u32,
    /// Nominal delay before the first retry
    pub base_delay: Duration,
    /// Cap for the nominal delay
    pub max_delay: Duration,
    /// Randomize delays within `[nominal / 2, nominal]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

/// Next step after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    RetryAfter(Duration),
    /// Surface the error
    GiveUp,
}

/// Information about a scheduled retry, handed to observers
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    /// Delay before the next attempt
    pub delay: Duration,
    /// Why the attempt failed
    pub error: &'a Error,
}

/// Backoff state for one operation
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    last_delay: Duration,
}

impl Backoff {
    /// Fresh state for the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt budget is spent
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts.max(1)
    }

    /// Record a failed attempt and decide what to do next
    ///
    /// Non-retryable errors give up immediately regardless of the budget.
    pub fn on_failure(&mut self, error: &Error) -> RetryDecision {
        self.attempts += 1;
        if !error.is_retryable() || self.is_exhausted() {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.next_delay())
    }

    /// Nominal delay before retry number `retry` (0-based)
    pub fn nominal_delay(policy: &RetryPolicy, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        policy
            .base_delay
            .saturating_mul(factor)
            .min(policy.max_delay)
    }

    fn next_delay(&mut self) -> Duration {
        let nominal = Self::nominal_delay(&self.policy, self.attempts - 1);
        let delay = if self.policy.jitter && !nominal.is_zero() {
            let half = nominal / 2;
            let spread = (nominal - half).as_millis() as u64;
            half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
        } else {
            nominal
        };

        let delay = delay.max(self.last_delay);
        self.last_delay = delay;
        delay
    }
}

impl RetryPolicy {
    /// Policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Start a fresh backoff state machine
    pub fn backoff(&self) -> Backoff {
        Backoff::new(*self)
    }

    /// Execute an async operation with retry
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_observed(operation, f, |_| {}).await.0
    }

    /// Execute an async operation with retry, reporting each scheduled retry
    ///
    /// Returns the final result together with the number of attempts made.
    pub async fn run_observed<T, F, Fut, O>(
        &self,
        operation: &str,
        mut f: F,
        mut observe: O,
    ) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        O: FnMut(&RetryAttempt<'_>),
    {
        let mut backoff = self.backoff();
        loop {
            match f().await {
                Ok(value) => {
                    if backoff.attempts() > 0 {
                        debug!(
                            operation,
                            attempt = backoff.attempts() + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return (Ok(value), backoff.attempts() + 1);
                }
                Err(error) => match backoff.on_failure(&error) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            operation,
                            attempt = backoff.attempts(),
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying after transient error"
                        );
                        observe(&RetryAttempt {
                            attempt: backoff.attempts(),
                            delay,
                            error: &error,
                        });
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        if error.is_retryable() {
                            warn!(
                                operation,
                                attempts = backoff.attempts(),
                                error = %error,
                                "Retry budget exhausted"
                            );
                        }
                        return (Err(error), backoff.attempts());
                    }
                },
            }
        }
    }
}
