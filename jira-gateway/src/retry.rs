//! Retry with exponential backoff, shared by every upstream call.

use crate::metrics_defs::UPSTREAM_RETRIES;
use shared::counter;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every further attempt.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delay after the given (1-based) failed attempt: `base * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The operation receives the attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, is_retryable: P, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut state = RetryState::new(self);

        loop {
            let err = match operation(state.attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) {
                return Err(RetryError::Permanent(err));
            }

            if state.attempt >= self.max_attempts {
                tracing::warn!(
                    attempts = state.attempt,
                    error = %err,
                    "Retry budget exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: state.attempt,
                    last: err,
                });
            }

            tracing::warn!(
                attempt = state.attempt,
                max_attempts = self.max_attempts,
                backoff_ms = state.next_delay.as_millis() as u64,
                error = %err,
                "Transient upstream failure, retrying"
            );
            counter!(UPSTREAM_RETRIES).increment(1);

            // Suspends only this request's task.
            sleep(state.next_delay).await;
            state.advance(self);
        }
    }
}

/// Progress of one logical request through its retry budget.
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    next_delay: Duration,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        RetryState {
            attempt: 1,
            next_delay: policy.backoff(1),
        }
    }

    fn advance(&mut self, policy: &RetryPolicy) {
        self.attempt += 1;
        self.next_delay = policy.backoff(self.attempt);
    }
}

#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate refused to retry.
    Permanent(E),
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
}
