use rand::Rng;
use std::time::Duration;

/// Redelivery delay for a failed message.
///
/// `initial * factor ^ min(attempt, cap_attempt)` plus a uniformly random
/// jitter in `[0, jitter)`. Growth stops at `cap_attempt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub factor: f64,
    pub jitter: Duration,
    pub cap_attempt: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            factor: 1.5,
            jitter: Duration::from_millis(500),
            cap_attempt: 5,
        }
    }
}

impl BackoffPolicy {
    /// The deterministic part of the delay. Saturates instead of overflowing;
    /// a negative or NaN product collapses to zero.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(self.cap_attempt)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        match Duration::try_from_secs_f64(secs) {
            Ok(delay) => delay,
            Err(_) if secs > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..self.jitter)
        };
        self.base_delay(attempt).saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_delays() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(1), Duration::from_millis(1500));
        assert_eq!(policy.base_delay(2), Duration::from_millis(2250));
    }

    #[test]
    fn test_base_delay_increases_then_plateaus() {
        let policy = BackoffPolicy::default();
        for attempt in 0..5 {
            assert!(policy.base_delay(attempt) < policy.base_delay(attempt + 1));
        }
        let plateau = policy.base_delay(5);
        for attempt in 6..50 {
            assert_eq!(policy.base_delay(attempt), plateau);
        }
        assert_eq!(policy.base_delay(u32::MAX), plateau);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = BackoffPolicy::default();
        for attempt in 0..10 {
            let base = policy.base_delay(attempt);
            let delay = policy.delay(attempt);
            assert!(delay >= base);
            assert!(delay < base + policy.jitter);
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy {
            jitter: Duration::ZERO,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay(3), policy.base_delay(3));
    }

    #[test]
    fn test_out_of_range_factors_do_not_panic() {
        let huge = BackoffPolicy {
            factor: 100.0,
            cap_attempt: 200,
            ..BackoffPolicy::default()
        };
        assert_eq!(huge.base_delay(200), Duration::MAX);
        assert_eq!(huge.delay(200), Duration::MAX);

        let negative = BackoffPolicy {
            factor: -1.5,
            ..BackoffPolicy::default()
        };
        assert_eq!(negative.base_delay(1), Duration::ZERO);
        assert!(negative.delay(1) < negative.jitter);

        let nan = BackoffPolicy {
            factor: f64::NAN,
            ..BackoffPolicy::default()
        };
        assert_eq!(nan.base_delay(3), Duration::ZERO);
    }
}
