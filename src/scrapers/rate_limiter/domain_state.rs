//! Per-host rate limiting state.

use std::time::{Duration, Instant};

use super::config::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct DomainState {
    pub current_delay: Duration,
    /// Start time reserved for the latest request, possibly in the future.
    pub last_request: Option<Instant>,
    /// Successes since the last rate limit hit.
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Multiply the delay up to the configured ceiling.
    pub fn back_off(&mut self, config: &RateLimitConfig, multiplier: f64) {
        let next = Duration::from_secs_f64(self.current_delay.as_secs_f64() * multiplier);
        self.current_delay = next.min(config.max_delay);
    }

    /// Record a success; returns true when the host just left backoff.
    pub fn record_success(&mut self, config: &RateLimitConfig) -> bool {
        self.consecutive_successes += 1;
        if !self.in_backoff || self.consecutive_successes < config.recovery_threshold {
            return false;
        }

        self.consecutive_successes = 0;
        let next = Duration::from_secs_f64(
            self.current_delay.as_secs_f64() * config.recovery_multiplier,
        );
        self.current_delay = next.max(config.min_delay);

        if self.current_delay <= config.base_delay {
            self.current_delay = config.base_delay;
            self.in_backoff = false;
            return true;
        }
        false
    }

    /// Reserve the next request slot at or after `now` and return it.
    ///
    /// Slots are `current_delay` apart, so callers reserving together are
    /// spaced out instead of all waiting for the same instant.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let slot = match self.last_request {
            Some(last) => (last + self.current_delay).max(now),
            None => now,
        };
        self.last_request = Some(slot);
        self.total_requests += 1;
        slot
    }
}
