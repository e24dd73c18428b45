//! Retry policy for the request pipeline.
//!
//! Transient failures (5xx, connection resets, DNS) are retried with
//! exponential backoff and full jitter up to a bounded number of attempts.
//! Every backoff sleep observes the cancellation token, so a cancelled
//! invocation stops at the next boundary instead of sleeping it out.

use crate::error::{Error, Result};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff strategy for calculating delay between retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Constant delay between retries.
    Constant,
    /// Exponential backoff: delay = initial_delay * multiplier^attempt
    Exponential {
        /// Multiplier for exponential growth
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn calculate_delay(&self, attempt: u32, initial_delay: Duration) -> Duration {
        let base_millis = initial_delay.as_millis() as f64;
        let delay_millis = match self {
            Self::Constant => base_millis,
            Self::Exponential { multiplier } => base_millis * multiplier.powf(attempt as f64),
        };
        Duration::from_millis(delay_millis as u64)
    }
}

/// Jitter strategy for spreading retries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Use the exact calculated delay.
    None,
    /// Random value between 0 and the calculated delay.
    Full,
}

impl JitterStrategy {
    /// Apply jitter to a calculated delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => {
                let millis = delay.as_millis() as f64;
                if millis > 0.0 {
                    let mut rng = rand::thread_rng();
                    Duration::from_millis(rng.gen_range(0.0..millis) as u64)
                } else {
                    Duration::ZERO
                }
            }
        }
    }
}

/// Retry policy configuration for the request pipeline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 means no retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the calculated delay.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// A policy with constant delay and no jitter, for tests.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }

    /// Whether another attempt may be issued after `attempt` attempts.
    pub fn should_continue(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before retry number `attempt` (0-indexed), capped and jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff.calculate_delay(attempt, self.initial_delay);
        self.jitter.apply(base.min(self.max_delay))
    }
}

/// Sleep that observes the cancellation token.
///
/// Returns `Err(Cancelled)` when the token fires before the delay elapses.
pub async fn wait(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled { last: None }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_constant() {
        let strategy = BackoffStrategy::Constant;
        let initial = Duration::from_secs(1);
        assert_eq!(strategy.calculate_delay(0, initial), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(5, initial), Duration::from_secs(1));
    }

    #[test]
    fn backoff_exponential() {
        let strategy = BackoffStrategy::Exponential { multiplier: 2.0 };
        let initial = Duration::from_secs(1);
        assert_eq!(strategy.calculate_delay(0, initial), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(1, initial), Duration::from_secs(2));
        assert_eq!(strategy.calculate_delay(3, initial), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterStrategy::None,
        };
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(4));
    }

    #[test]
    fn full_jitter_stays_in_range() {
        let jitter = JitterStrategy::Full;
        let delay = Duration::from_secs(10);
        for _ in 0..100 {
            assert!(jitter.apply(delay) <= delay);
        }
    }

    #[test]
    fn attempt_accounting() {
        let policy = RetryPolicy::default();
        assert!(policy.should_continue(2));
        assert!(!policy.should_continue(3));
        assert!(!RetryPolicy::no_retry().should_continue(1));
    }

    #[tokio::test]
    async fn wait_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait(Duration::from_secs(60), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn wait_completes_without_cancellation() {
        let cancel = CancellationToken::new();
        assert!(wait(Duration::from_millis(5), &cancel).await.is_ok());
    }
}
