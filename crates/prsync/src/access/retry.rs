//! Classified retry around a single remote call.
//!
//! Every attempt, including retries, is admitted by the [`RateGovernor`]
//! first. The attempt's result is then classified into an [`AttemptOutcome`]:
//!
//! | Outcome | Action |
//! |---|---|
//! | `Success` | return the value |
//! | `NotFound` | return `None`, no retry |
//! | `QuotaExceeded` | wait for the quota reset, retry without spending the budget |
//! | `Retryable` | back off `base^attempt` time units, up to `max_retries` times |
//! | `Fatal` | return the error |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use chrono::{DateTime, Utc};

use super::errors::{ApiError, ErrorKind, Result, short_error_message};
use super::governor::RateGovernor;

/// Default number of retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default exponential backoff base.
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

/// Retry budget and backoff schedule for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff base; retry `n` (1-based) waits `base^n` time units.
    pub base: u32,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Length of one time unit.
    pub time_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max_retries: DEFAULT_MAX_RETRIES,
            time_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Build the exponential backoff schedule for this policy.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        let first = self.time_unit.saturating_mul(self.base);
        let last = self
            .time_unit
            .saturating_mul(self.base.saturating_pow(self.max_retries));

        ExponentialBuilder::default()
            .with_min_delay(first)
            .with_max_delay(last)
            .with_factor(self.base as f32)
            .with_max_times(self.max_retries as usize)
    }

    /// The delays applied before each retry, in order.
    pub fn delays(&self) -> ExponentialBackoff {
        self.backoff().build()
    }
}

/// Classified result of one attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    NotFound,
    QuotaExceeded { reset_at: Option<DateTime<Utc>> },
    Retryable(ApiError),
    Fatal(ApiError),
}

impl<T> AttemptOutcome<T> {
    pub fn classify(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Self::NotFound,
                ErrorKind::QuotaExceeded => Self::QuotaExceeded {
                    reset_at: match err {
                        ApiError::QuotaExceeded { reset_at } => reset_at,
                        _ => None,
                    },
                },
                ErrorKind::TransientFailure => Self::Retryable(err),
                ErrorKind::AuthFailure | ErrorKind::Fatal => Self::Fatal(err),
            },
        }
    }
}

/// Counters describing one [`RetryingExecutor::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Calls actually made.
    pub attempts: u32,
    /// Retries after transient failures.
    pub retries: u32,
    /// Waits for a quota reset.
    pub quota_waits: u32,
    /// Total backoff slept, excluding quota waits.
    pub backoff: Duration,
}

/// Final result of a run together with its counters.
#[derive(Debug)]
#[must_use]
pub struct Executed<T> {
    /// `Ok(None)` when the resource was not found.
    pub result: Result<Option<T>>,
    pub stats: ExecutionStats,
}

/// Runs remote calls under the governor with classified retries.
#[derive(Debug)]
pub struct RetryingExecutor {
    governor: Arc<RateGovernor>,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(governor: Arc<RateGovernor>, policy: RetryPolicy) -> Self {
        Self { governor, policy }
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `call`, returning `Ok(None)` if the resource does not exist.
    pub async fn execute<T, F, Fut>(&self, resource: &str, call: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(resource, call).await.result
    }

    /// Execute `call` and report how many attempts, retries and waits it took.
    pub async fn run<T, F, Fut>(&self, resource: &str, mut call: F) -> Executed<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delays = self.policy.delays();
        let mut stats = ExecutionStats::default();

        let result = loop {
            self.governor.admit().await;
            stats.attempts += 1;

            match AttemptOutcome::classify(call().await) {
                AttemptOutcome::Success(value) => break Ok(Some(value)),
                AttemptOutcome::NotFound => {
                    tracing::debug!(resource, "Remote resource not found");
                    break Ok(None);
                }
                AttemptOutcome::QuotaExceeded { reset_at } => {
                    stats.quota_waits += 1;
                    self.governor.wait_for_reset(reset_at).await;
                }
                AttemptOutcome::Retryable(err) => match delays.next() {
                    Some(delay) => {
                        stats.retries += 1;
                        stats.backoff += delay;
                        tracing::warn!(
                            resource,
                            attempt = stats.attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %short_error_message(&err),
                            "Transient failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::warn!(
                            resource,
                            attempts = stats.attempts,
                            error = %short_error_message(&err),
                            "Retries exhausted"
                        );
                        break Err(ApiError::RetriesExhausted {
                            attempts: stats.attempts,
                            message: short_error_message(&err),
                        });
                    }
                },
                AttemptOutcome::Fatal(err) => break Err(err),
            }
        };

        Executed { result, stats }
    }
}
