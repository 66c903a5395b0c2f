use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::InferenceBackend;
use crate::config::RunConfig;
use crate::error::{BackendError, RequestError};
use crate::prompts::PromptRequest;

/// Default upper bound for a single backoff sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Delay before retry number `attempt + 1`: `initial_delay * 2^attempt`, capped at `max_delay`.
#[must_use]
pub fn backoff_delay(attempt: u32, initial_delay: Duration, max_delay: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    initial_delay.checked_mul(factor).unwrap_or(max_delay).min(max_delay)
}

/// The sleeps taken before each of `retries` retries.
pub fn backoff_schedule(retries: u32, initial_delay: Duration, max_delay: Duration) -> Vec<Duration> {
    (0..retries)
        .map(|attempt| backoff_delay(attempt, initial_delay, max_delay))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Pause before every logical call except the first.
    pub call_delay: Duration,
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.retry_base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            call_delay: config.call_delay,
            request_timeout: config.request_timeout,
        }
    }
}

/// Paces and retries calls to an [`InferenceBackend`]. One call in flight at a time.
pub struct RateLimitedClient {
    backend: Box<dyn InferenceBackend>,
    policy: RetryPolicy,
    calls: AtomicU64,
    attempts: AtomicU64,
}

impl RateLimitedClient {
    pub fn new(backend: Box<dyn InferenceBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            calls: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model_name(&self) -> String {
        self.backend.model_name()
    }

    /// Logical calls made through [`complete`](Self::complete).
    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Attempts that reached the backend, retries included.
    pub fn requests_sent(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn complete(&self, request: &PromptRequest) -> Result<String, RequestError> {
        let previous_calls = self.calls.fetch_add(1, Ordering::SeqCst);
        if previous_calls > 0 && !self.policy.call_delay.is_zero() {
            debug!(delay_ms = self.policy.call_delay.as_millis() as u64, "Pacing before request");
            tokio::time::sleep(self.policy.call_delay).await;
        }

        let mut attempt: u32 = 0;
        loop {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = match tokio::time::timeout(
                self.policy.request_timeout,
                self.backend.generate(request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendError::Transient(format!(
                    "no response within {:?}",
                    self.policy.request_timeout
                ))),
            };

            match outcome {
                Ok(text) => {
                    debug!(kind = ?request.kind, attempts = attempt + 1, "Request succeeded");
                    return Ok(text);
                }
                Err(BackendError::ModelUnavailable(detail)) => {
                    return Err(RequestError::ModelUnavailable {
                        model: self.backend.model_name(),
                        detail,
                    });
                }
                Err(BackendError::Rejected(detail)) => {
                    return Err(RequestError::RequestFailed {
                        attempts: attempt + 1,
                        detail,
                    });
                }
                Err(BackendError::RateLimited(_)) if attempt >= self.policy.max_retries => {
                    return Err(RequestError::RateLimitExceeded {
                        attempts: attempt + 1,
                    });
                }
                Err(BackendError::Transient(detail)) if attempt >= self.policy.max_retries => {
                    return Err(RequestError::RequestFailed {
                        attempts: attempt + 1,
                        detail,
                    });
                }
                Err(error) => {
                    let delay =
                        backoff_delay(attempt, self.policy.initial_delay, self.policy.max_delay);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Request failed with retryable error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
