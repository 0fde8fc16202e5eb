//! Exponential backoff with jitter between retry attempts
//!
//! Delay for attempt `n` (1-based, counted after the failure):
//! `min(max_delay, base_delay * 2^min(n, max_exponent) + uniform(0, jitter))`

use rand::Rng;
use std::time::Duration;

/// Backoff schedule used by the retry client
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay unit multiplied by the exponential factor
    pub base_delay: Duration,
    /// Hard cap on a single sleep
    pub max_delay: Duration,
    /// Exponent stops growing after this many attempts
    pub max_exponent: u32,
    /// Upper bound of the uniform random jitter added to each delay
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            max_exponent: 7,
            jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter bound; `Duration::ZERO` makes delays deterministic
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the next try, after `attempt` failures, for a jitter
    /// sample in `[0, 1)`
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(self.max_exponent));
        let exp_delay = self.base_delay.saturating_mul(factor);
        let jitter = self.jitter.mul_f64(sample.clamp(0.0, 1.0));
        exp_delay.saturating_add(jitter).min(self.max_delay)
    }

    /// Delay before the next try, after `attempt` failures
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample = if self.jitter.is_zero() {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..1.0)
        };
        self.delay_with_sample(attempt, sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert_eq!(policy.max_exponent, 7);
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = BackoffPolicy::default().with_jitter(Duration::ZERO);

        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_exponent_and_delay_are_capped() {
        let policy = BackoffPolicy::default().with_jitter(Duration::ZERO);

        // 0.5s * 2^7 = 64s, capped to 60s
        assert_eq!(policy.delay(7), Duration::from_secs(60));
        assert_eq!(policy.delay(50), Duration::from_secs(60));

        let short_cap = policy.with_max_delay(Duration::from_secs(3));
        assert_eq!(short_cap.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = BackoffPolicy::default();

        for _ in 0..100 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_secs(1), "delay was {:?}", delay);
            assert!(delay < Duration::from_secs(2), "delay was {:?}", delay);
        }
    }

    #[test]
    fn test_delays_strictly_increase_with_jitter() {
        let policy = BackoffPolicy::default();

        // Worst case: max jitter early, no jitter later
        let first = policy.delay_with_sample(1, 0.999);
        let second = policy.delay_with_sample(2, 0.0);
        let third = policy.delay_with_sample(3, 0.0);

        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn test_sample_is_clamped() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delay_with_sample(1, 5.0),
            Duration::from_secs(2),
        );
        assert_eq!(policy.delay_with_sample(1, -1.0), Duration::from_secs(1));
    }
}
