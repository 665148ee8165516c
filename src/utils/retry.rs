//! Exponential backoff for transient API failures.
//!
//! Only errors reporting [`HarvestError::is_retryable`] are retried:
//! connection-level failures, 5xx and 429. Authentication failures and
//! count drift surface immediately.

use crate::utils::error::HarvestError;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(16);
const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration, attempt: u32 },
    DoNotRetry { reason: String },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, used where a retry would repeat a side effect.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-indexed failed attempt).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = DEFAULT_BACKOFF_MULTIPLIER.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, error: &HarvestError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: format!("non-retryable error ({:?})", error.category()),
            };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) reached", self.max_attempts),
            };
        }

        let delay = self.delay_for(attempt);
        tracing::debug!(attempt, ?delay, "scheduling retry");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}
