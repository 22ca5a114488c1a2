//! Exponential backoff for change feed reconnection attempts.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Backoff state across consecutive failed attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay.min(config.max_delay);
        Self { config, current }
    }

    /// Return the delay to wait before the next attempt and grow it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = next_delay(delay, &self.config);
        delay
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay.min(self.config.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = BackoffConfig::default();
        assert_eq!(next_delay(Duration::from_secs(1), &config), Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(8), &config), Duration::from_secs(10));
        assert_eq!(next_delay(Duration::from_secs(10), &config), Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let config = BackoffConfig {
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(2), &config), Duration::from_secs(6));
    }

    #[test]
    fn full_backoff_sequence() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(backoff.next_delay().as_secs(), expected_secs);
        }
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
