//! Exponential backoff for fit retries

use std::time::Duration;

use et_core::config::BackoffConfig;

/// Exponential backoff with jitter
pub struct ExponentialBackoff {
    /// Delay returned by the next call
    current: Duration,
    /// Delay to return to on reset
    initial: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a new backoff with custom parameters.
    ///
    /// A multiplier that is not a finite number >= 1 holds the delay
    /// constant; jitter is clamped to `0.0..=1.0`.
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        let initial = initial.min(max);
        Self {
            current: initial,
            initial,
            max,
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
            jitter: if jitter.is_nan() {
                0.0
            } else {
                jitter.clamp(0.0, 1.0)
            },
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = next.min(self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay.saturating_add(Duration::try_from_secs_f64(jitter_amount).unwrap_or_default())
    }

    /// Reset the backoff to its initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_increases() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(50),
            Duration::from_secs(1),
            2.0,
            0.0,
        );

        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_max_and_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(600), Duration::from_secs(1), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_millis(600));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(600));
    }

    #[test]
    fn test_backoff_survives_unusable_parameters() {
        for multiplier in [f64::INFINITY, f64::NAN, -2.0, 0.5] {
            let mut backoff = ExponentialBackoff::new(
                Duration::from_millis(50),
                Duration::from_secs(1),
                multiplier,
                f64::NAN,
            );
            for _ in 0..5 {
                assert_eq!(backoff.next_delay(), Duration::from_millis(50));
            }
        }
    }

    #[test]
    fn test_backoff_clamps_at_huge_max() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(u64::MAX / 4), Duration::MAX, 1e300, 1.0);
        for _ in 0..4 {
            assert!(backoff.next_delay() <= Duration::MAX);
        }
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 1.0, 0.5);
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
