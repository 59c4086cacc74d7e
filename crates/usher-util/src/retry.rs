//! Retry policy for external scheduler calls

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with exponential backoff and jitter.
///
/// `max_attempts` counts the initial attempt, so `max_attempts = 1` means
/// no retry at all.
///
/// ```
/// use usher_util::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(4)
///     .with_initial_interval(Duration::from_millis(100))
///     .with_jitter(0.0);
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial one)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Upper bound on any single delay
    pub max_interval: Duration,

    /// Backoff multiplier (2.0 doubles each time)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0); 0.1 means ±10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff: 3 attempts, 200ms initial, 5s cap, 2x, 10% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait before the given attempt (1-based). Attempt 1 never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1;
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 && capped > 0.0 {
            let jitter_range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(3))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(10))
            .with_max_interval(Duration::from_secs(60))
            .with_jitter(0.1);

        for _ in 0..50 {
            let d = policy.delay_for_attempt(2);
            assert!(d >= Duration::from_secs(9) && d <= Duration::from_secs(11));
        }
    }

    #[test]
    fn attempts_remaining() {
        let policy = RetryPolicy::exponential().with_max_attempts(3);
        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));

        let once = RetryPolicy::no_retry();
        assert!(!once.has_attempts_remaining(1));
    }

    #[test]
    fn max_attempts_never_zero() {
        let policy = RetryPolicy::exponential().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }
}
