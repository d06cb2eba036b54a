//! Rate limiter configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Delay between requests to the same host when not backing off.
    pub base_delay: Duration,
    /// Floor the delay never drops below while recovering.
    pub min_delay: Duration,
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Applied to the current delay on 429/503.
    pub backoff_multiplier: f64,
    /// Applied to the current delay after `recovery_threshold` successes.
    pub recovery_multiplier: f64,
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

impl RateLimitConfig {
    /// Default backoff behaviour around a custom base delay.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            min_delay: base_delay.min(Duration::from_millis(100)),
            ..Default::default()
        }
    }
}
