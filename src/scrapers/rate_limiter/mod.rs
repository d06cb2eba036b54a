//! Adaptive per-host rate limiter.
//!
//! Spaces requests to the same host and adapts the spacing to responses:
//! backs off on 429/503, mildly on other 5xx, and recovers after a run of
//! successes.

mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

pub use config::RateLimitConfig;
use domain_state::DomainState;

/// Rate limiter shared by every clone of an `HttpClient`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Reserve the host's next request slot and wait for it. Returns the
    /// host, or `None` for URLs without one.
    ///
    /// The slot is taken under the write lock, so concurrent callers are
    /// spaced `current_delay` apart rather than released together.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let slot = {
            let mut domains = self.domains.write().await;
            domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay))
                .reserve(Instant::now())
        };

        let wait_time = slot.saturating_duration_since(Instant::now());
        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Some(domain)
    }

    /// Feed a response status back into the host's state.
    pub async fn report_status(&self, domain: &str, status_code: u16) {
        match status_code {
            429 | 503 => self.report_rate_limit(domain, status_code).await,
            500..=599 => self.report_server_error(domain).await,
            200..=399 => self.report_success(domain).await,
            _ => {}
        }
    }

    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            if state.record_success(&self.config) {
                info!("Host {} recovered from rate limit backoff", domain);
            }
        }
    }

    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;
            state.back_off(&self.config, self.config.backoff_multiplier);
            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.back_off(&self.config, 1.5);
            debug!(
                "Server error from {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://api.pushshift.io/reddit/search/submission/"),
            Some("api.pushshift.io".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    async fn state(limiter: &RateLimiter, domain: &str) -> DomainState {
        limiter.domains.read().await[domain].clone()
    }

    #[tokio::test]
    async fn test_backoff_on_rate_limit() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            ..Default::default()
        });

        limiter.acquire("https://i.redd.it/a.jpg").await;
        limiter.report_status("i.redd.it", 429).await;

        let host = state(&limiter, "i.redd.it").await;
        assert!(host.current_delay >= Duration::from_millis(20));
        assert!(host.in_backoff);
        assert_eq!(host.rate_limit_hits, 1);
        assert_eq!(host.total_requests, 1);
    }

    #[tokio::test]
    async fn test_client_errors_leave_delay_alone() {
        let limiter = RateLimiter::with_config(RateLimitConfig::with_base_delay(
            Duration::from_millis(10),
        ));
        limiter.acquire("https://i.redd.it/a.jpg").await;
        limiter.report_status("i.redd.it", 404).await;

        let host = state(&limiter, "i.redd.it").await;
        assert_eq!(host.current_delay, Duration::from_millis(10));
        assert!(!host.in_backoff);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_are_spaced() {
        let delay = Duration::from_millis(40);
        let limiter = RateLimiter::with_config(RateLimitConfig::with_base_delay(delay));

        let urls: Vec<String> = (0..4).map(|i| format!("https://i.redd.it/{}.png", i)).collect();
        let start = Instant::now();
        let hosts = futures::future::join_all(urls.iter().map(|u| limiter.acquire(u))).await;

        assert!(hosts.iter().all(|h| h.as_deref() == Some("i.redd.it")));
        assert!(start.elapsed() >= delay * 3);

        // Other hosts are not held back by this one.
        let other = Instant::now();
        limiter.acquire("https://api.pushshift.io/x").await;
        assert!(other.elapsed() < delay);
    }
}
