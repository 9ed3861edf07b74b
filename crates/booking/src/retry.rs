//! Backoff for transactions that found their showtime busy.

use std::time::Duration;

/// Retry policy with exponential backoff.
///
/// Defaults: 3 retries, 25ms initial delay, doubling, capped at 1s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// A policy that surfaces the first lock timeout.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(80));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(50),
            ..RetryPolicy::new(10, Duration::from_millis(10))
        };
        assert_eq!(policy.delay_for_attempt(8), Duration::from_millis(50));
    }

    #[test]
    fn no_retry_policy() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
    }
}
