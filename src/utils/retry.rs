// src/utils/retry.rs

//! Retry executor with exponential, jittered backoff.
//!
//! The wrapped operation reports each attempt through [`Attempt`]:
//! `Ready` ends the loop, `Retry` schedules another attempt. Returning `Err`
//! aborts immediately and hands the original error back in
//! [`Outcome::Aborted`]. Exhaustion is an [`Outcome::GaveUp`] value, not an
//! error, so the caller decides what running out of attempts means.
//!
//! Only one attempt is in flight per invocation. Dropping the returned future
//! or cancelling the token drops the pending timer and the attempt with it.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Total attempts before giving up; unbounded when unset
    #[serde(default)]
    pub max_retry: Option<u32>,

    /// Delay before the second attempt
    #[serde(default = "defaults::initial_delay")]
    pub initial_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,

    /// Upper bound of the random addition to each delay
    #[serde(default = "defaults::random_jitter")]
    pub random_jitter_ms: u64,

    /// Ceiling on the geometric growth
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound of the random addition once the ceiling is reached
    #[serde(default = "defaults::max_delay_jitter")]
    pub max_delay_jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retry: None,
            initial_delay_ms: defaults::initial_delay(),
            multiplier: defaults::multiplier(),
            random_jitter_ms: defaults::random_jitter(),
            max_delay_ms: defaults::max_delay(),
            max_delay_jitter_ms: defaults::max_delay_jitter(),
        }
    }
}

impl BackoffConfig {
    /// Schedule with a bounded number of attempts.
    pub fn bounded(max_retry: u32) -> Self {
        Self {
            max_retry: Some(max_retry),
            ..Self::default()
        }
    }

    /// Schedule without random jitter.
    pub fn without_jitter(mut self) -> Self {
        self.random_jitter_ms = 0;
        self.max_delay_jitter_ms = 0;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retry == Some(0) {
            return Err(AppError::config("retry.max_retry must be > 0"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(AppError::config("retry.multiplier must be >= 1.0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(AppError::config(
                "retry.max_delay_ms must be >= retry.initial_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, F> {
    /// The operation finished; stop retrying
    Ready(T),
    /// The operation failed transiently; try again
    Retry(F),
}

/// Final result of a retried operation.
#[derive(Debug)]
pub enum Outcome<T, F, E> {
    Succeeded(T),
    /// Every allowed attempt asked to retry
    GaveUp { attempts: u32, last: F },
    /// The operation returned an error; it is not retried
    Aborted(E),
    /// The caller cancelled before the operation finished
    Cancelled,
}

/// Retry executor.
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay after the `retry`-th failed attempt (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self.config.initial_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = grown.min(self.config.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay after the `retry`-th failed attempt, with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let jitter_bound = if base.as_millis() >= u128::from(self.config.max_delay_ms) {
            self.config.max_delay_jitter_ms
        } else {
            self.config.random_jitter_ms
        };
        if jitter_bound == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_bound);
        base + Duration::from_millis(jitter)
    }

    /// Run `operation` until it is ready, errors, or attempts run out.
    ///
    /// The closure receives the 0-based attempt number.
    pub async fn run<T, F, E, Op, Fut>(&self, operation: Op) -> Outcome<T, F, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<Attempt<T, F>, E>>,
    {
        self.run_until_cancelled(&CancellationToken::new(), operation)
            .await
    }

    /// Like [`Backoff::run`], but stops as soon as `token` is cancelled.
    pub async fn run_until_cancelled<T, F, E, Op, Fut>(
        &self,
        token: &CancellationToken,
        mut operation: Op,
    ) -> Outcome<T, F, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<Attempt<T, F>, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if token.is_cancelled() {
                return Outcome::Cancelled;
            }

            let result = tokio::select! {
                _ = token.cancelled() => return Outcome::Cancelled,
                result = operation(attempt) => result,
            };

            let failure = match result {
                Ok(Attempt::Ready(value)) => {
                    if attempt > 0 {
                        log::debug!("Operation succeeded after {} attempts", attempt + 1);
                    }
                    return Outcome::Succeeded(value);
                }
                Ok(Attempt::Retry(failure)) => failure,
                Err(error) => return Outcome::Aborted(error),
            };

            attempt += 1;
            if self.config.max_retry.is_some_and(|max| attempt >= max) {
                return Outcome::GaveUp {
                    attempts: attempt,
                    last: failure,
                };
            }

            let delay = self.delay(attempt - 1);
            log::debug!(
                "Attempt {} failed, retrying in {}ms",
                attempt,
                delay.as_millis()
            );
            tokio::select! {
                _ = token.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

mod defaults {
    pub fn initial_delay() -> u64 {
        1_000
    }
    pub fn multiplier() -> f64 {
        2.0
    }
    pub fn random_jitter() -> u64 {
        1_000
    }
    pub fn max_delay() -> u64 {
        60_000
    }
    pub fn max_delay_jitter() -> u64 {
        10_000
    }
}
