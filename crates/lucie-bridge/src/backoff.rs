//! Exponential backoff for reconnection

use std::time::Duration;

use lucie_core::config::BridgeConfig;

/// Retry schedule for reconnection attempts.
///
/// Delay for attempt n is `min(base * 2^(n-1), cap)`, with optional jitter
/// on top. The attempt counter advances with each recorded attempt and is
/// reset to zero by any successful connection.
pub struct RetrySchedule {
    /// Delay before the first retry
    base: Duration,
    /// Maximum delay
    cap: Duration,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
    /// Attempts spent in the current series
    attempt: u32,
    /// Budget per series
    max_attempts: u32,
}

impl RetrySchedule {
    /// Create a new schedule with custom parameters
    pub fn new(base: Duration, cap: Duration, jitter: f64, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            jitter,
            attempt: 0,
            max_attempts,
        }
    }

    /// Create a schedule from bridge configuration
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.backoff.base,
            config.backoff.cap,
            config.backoff.jitter,
            config.max_reconnect_attempts,
        )
    }

    /// Delay for the given 1-based attempt number, without jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // Shift in u128 millis; the cap keeps large exponents irrelevant
        let exp = (attempt - 1).min(63);
        let millis = (self.base.as_millis()) << exp;
        let capped = millis.min(self.cap.as_millis());
        Duration::from_millis(capped as u64)
    }

    /// Record one attempt and return its 1-based number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Delay to wait after the most recent attempt, with jitter applied
    pub fn next_delay(&self) -> Duration {
        let delay = self.delay_for(self.attempt);
        if self.jitter > 0.0 {
            let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
            delay + Duration::from_secs_f64(jitter_amount)
        } else {
            delay
        }
    }

    /// Attempts spent in the current series
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Budget per series
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the current series has spent its budget
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Reset the counter, starting a fresh series
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let schedule = RetrySchedule::new(Duration::from_secs(1), Duration::from_secs(60), 0.0, 5);

        assert_eq!(schedule.delay_for(1), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(3), Duration::from_secs(4));
        assert_eq!(schedule.delay_for(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped() {
        let schedule = RetrySchedule::new(Duration::from_secs(30), Duration::from_secs(60), 0.0, 5);

        assert_eq!(schedule.delay_for(1), Duration::from_secs(30));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(60)); // Capped
        assert_eq!(schedule.delay_for(10), Duration::from_secs(60)); // Still capped
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let schedule = RetrySchedule::new(Duration::from_secs(1), Duration::from_secs(60), 0.0, 5);
        assert_eq!(schedule.delay_for(100), Duration::from_secs(60));
    }

    #[test]
    fn test_counter_and_reset() {
        let mut schedule =
            RetrySchedule::new(Duration::from_millis(10), Duration::from_millis(80), 0.0, 3);

        assert_eq!(schedule.record_attempt(), 1);
        assert_eq!(schedule.record_attempt(), 2);
        assert_eq!(schedule.record_attempt(), 3);
        assert!(schedule.exhausted());

        schedule.reset();
        assert_eq!(schedule.attempt(), 0);
        assert!(!schedule.exhausted());
        assert_eq!(schedule.record_attempt(), 1);
        assert_eq!(schedule.next_delay(), Duration::from_millis(10));
    }
}
