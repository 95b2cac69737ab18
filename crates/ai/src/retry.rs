//! Bounded retry with exponential backoff and jitter.

use std::time::Duration;

use rand::RngExt;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::AiError;
use crate::generator::{GenerateRequest, TextGenerator};

/// Retry configuration for AI calls.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]` applied to each delay.
    pub jitter: f64,
    /// Deadline for each individual attempt.
    pub deadline: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
            deadline: Duration::from_secs(60),
        }
    }
}

impl RetryStrategy {
    /// Override the per-attempt deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delay before retry number `attempt` (1-based), with exponential
    /// growth, the configured cap, and jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.as_millis() as u64 * (1_u64 << (attempt - 1).min(16));
        let capped = exp.min(self.max_delay.as_millis() as u64);
        let jitter_span = (capped as f64 * self.jitter) as u64;
        let jittered = if jitter_span == 0 {
            capped
        } else {
            capped + rand::rng().random_range(0..=jitter_span)
        };
        Duration::from_millis(jittered)
    }
}

/// Call the generator with per-attempt deadlines, retrying transient
/// faults up to the strategy's attempt budget.
///
/// A rate-limit `retry_after` hint overrides the computed backoff for
/// that retry. Terminal errors (refusals, invalid requests) return
/// immediately.
pub async fn retry_generate(
    generator: &dyn TextGenerator,
    request: &GenerateRequest,
    strategy: &RetryStrategy,
) -> Result<Value, AiError> {
    let mut attempt = 1;
    loop {
        let result = match timeout(strategy.deadline, generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout {
                deadline: strategy.deadline,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < strategy.max_attempts => {
                let delay = match &err {
                    AiError::RateLimited {
                        retry_after: Some(hint),
                    } => *hint,
                    _ => strategy.delay_for(attempt),
                };
                warn!(
                    attempt,
                    max_attempts = strategy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying ai call"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(attempt, error = %err, "ai call failed terminally");
                return Err(err);
            }
        }
    }
}
