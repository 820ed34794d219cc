//! Retry policy for transient dispatch failures.
//!
//! The policy is an explicit, unit-testable object: given an attempt count
//! and the error it produced, it answers "retry after this delay" or "give
//! up". Sleeping is behind the [`Sleep`] abstraction so the sequence can be
//! exercised in tests without real delays.

use crate::dispatch::DispatchError;
use async_trait::async_trait;
use std::time::Duration;

/// What to do after a failed dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the delay, then attempt again.
    RetryAfter(Duration),
    /// Stop attempting.
    GiveUp,
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay for each subsequent attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    /// 3 total attempts with delays of 1s and 2s before attempts 2 and 3.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt number `attempt` (1-based) failed
    /// with `error`. Permanent errors give up immediately regardless of
    /// remaining attempts.
    pub fn evaluate(&self, attempt: u32, error: &DispatchError) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay_before(attempt + 1))
        }
    }

    /// Delay inserted before the given attempt. Attempts are 1-based and
    /// the first attempt carries no delay, so `attempt` must be >= 2.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 2);
        self.initial_delay * self.multiplier.saturating_pow(attempt.saturating_sub(2))
    }
}

/// Suspension abstraction so retry sequences are testable without waiting.
#[async_trait]
pub trait Sleep: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleep;

#[async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;

    fn transient() -> DispatchError {
        DispatchError::Transport(NotificationError::ProviderError("timeout".to_string()))
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
    }

    #[test]
    fn test_transient_errors_retry_until_attempt_ceiling() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.evaluate(1, &transient()),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            policy.evaluate(2, &transient()),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(policy.evaluate(3, &transient()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_permanent_errors_give_up_immediately() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.evaluate(1, &DispatchError::UnknownKind),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.evaluate(1, &DispatchError::Template("bad".to_string())),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_custom_policy_scaling() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(250),
            multiplier: 3,
        };

        assert_eq!(policy.delay_before(2), Duration::from_millis(250));
        assert_eq!(policy.delay_before(3), Duration::from_millis(750));
        assert_eq!(policy.delay_before(4), Duration::from_millis(2250));
        assert_eq!(policy.evaluate(4, &transient()), RetryDecision::GiveUp);
    }
}
