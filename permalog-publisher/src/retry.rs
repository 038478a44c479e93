//! Retry policy
//!
//! Backoff schedule for upload attempts and index writes.

use std::time::Duration;

/// Retry policy
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// No retry
    None,
    /// Fixed delay between retries
    Fixed { delay_ms: u64 },
    /// Exponential backoff
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 500,
            max_delay_ms: 15_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt number `attempt`
    /// (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            RetryPolicy::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let delay = (*initial_delay_ms as f64)
                    * multiplier.powi(attempt.saturating_sub(1) as i32);
                Duration::from_millis(delay.min(*max_delay_ms as f64) as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() {
        let policy = RetryPolicy::Fixed { delay_ms: 100 };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_caps_at_max() {
        let policy = RetryPolicy::Exponential {
            initial_delay_ms: 500,
            max_delay_ms: 15_000,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(12), Duration::from_millis(15_000));
    }
}
