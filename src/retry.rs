//! Retry logic with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::Config;

/// Backoff schedule for transient send failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.max_backoff(),
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, clamped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Like `delay_for`, but never shorter than a server-provided hint
    pub fn delay_with_hint(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let computed = self.delay_for(retry);
        match hint {
            Some(hint) => computed.max(hint).min(self.max_delay),
            None => computed,
        }
    }
}

/// Errors the retry loop can classify
pub trait Retryable {
    /// Worth another attempt
    fn is_transient(&self) -> bool;

    /// Minimum wait requested by the server, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// How a retried operation ended
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    /// Non-transient failure, not retried
    Permanent { error: E, attempts: u32 },
    /// Transient failures on every allowed attempt
    Exhausted { error: E, attempts: u32 },
    /// Shutdown arrived while waiting to retry
    Cancelled { error: E, attempts: u32 },
}

/// Retry an async operation with exponential backoff.
///
/// The first attempt always runs. Once `cancel` flips to `true`, no further
/// backoff wait starts and a wait in progress is abandoned.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &BackoffPolicy,
    cancel: &watch::Receiver<bool>,
    mut operation: F,
    mut on_retry: R,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
    R: FnMut(u32, &E, Duration),
{
    let mut cancel = cancel.clone();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            return RetryOutcome::Permanent {
                error,
                attempts: attempt,
            };
        }

        let retry = attempt;
        if retry > policy.max_retries {
            return RetryOutcome::Exhausted {
                error,
                attempts: attempt,
            };
        }

        if *cancel.borrow() {
            return RetryOutcome::Cancelled {
                error,
                attempts: attempt,
            };
        }

        let delay = policy.delay_with_hint(retry, error.retry_after());
        on_retry(attempt, &error, delay);

        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancel.wait_for(|stopped| *stopped) => {
                return RetryOutcome::Cancelled {
                    error,
                    attempts: attempt,
                };
            }
        }
    }
}
