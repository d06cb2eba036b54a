//! HTTP client with per-host rate limiting and via URL rewriting.

mod response;
mod user_agent;

pub use response::{BodyStream, HttpResponse};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use thiserror::Error;

use super::rate_limiter::{RateLimitConfig, RateLimiter};

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
    #[error("invalid via mapping '{from}' -> '{to}': target must be an http(s) URL")]
    InvalidVia { from: String, to: String },
}

/// HTTP client used for both the search API and image hosts.
///
/// URL rewriting (via):
/// - URLs starting with a mapping key are fetched from the mapped prefix
///   instead (caching proxies, mirrors, local test servers)
/// - Callers keep the original URL for naming files; only the request changes
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    source_id: String,
    rate_limiter: RateLimiter,
    via_mappings: Arc<HashMap<String, String>>,
}

fn extract_response_headers(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// Builder for `HttpClient`.
pub struct HttpClientBuilder {
    source_id: String,
    timeout: Duration,
    request_delay: Duration,
    user_agent: Option<String>,
    via_mappings: Option<HashMap<String, String>>,
}

impl HttpClientBuilder {
    /// Set the user agent string (`"impersonate"` picks a browser agent).
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    /// Set via URL rewriting mappings.
    pub fn via(mut self, mappings: HashMap<String, String>) -> Self {
        self.via_mappings = Some(mappings);
        self
    }

    pub fn build(self) -> Result<HttpClient, HttpClientError> {
        let user_agent = resolve_user_agent(self.user_agent.as_deref());

        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        let rate_limiter =
            RateLimiter::with_config(RateLimitConfig::with_base_delay(self.request_delay));

        let via_mappings = self.via_mappings.unwrap_or_default();
        for (from, to) in &via_mappings {
            if !(to.starts_with("http://") || to.starts_with("https://")) {
                return Err(HttpClientError::InvalidVia {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        if !via_mappings.is_empty() {
            tracing::info!(
                "HTTP client '{}' configured with {} via mapping(s)",
                self.source_id,
                via_mappings.len()
            );
            for (from, to) in &via_mappings {
                tracing::debug!("  Via: {} -> {}", from, to);
            }
        }

        Ok(HttpClient {
            client,
            source_id: self.source_id,
            rate_limiter,
            via_mappings: Arc::new(via_mappings),
        })
    }
}

impl HttpClient {
    /// Create a builder.
    ///
    /// - `source_id`: label used in logs
    /// - `timeout`: whole-request timeout, body included
    /// - `request_delay`: base spacing between requests to one host
    pub fn builder(source_id: &str, timeout: Duration, request_delay: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            source_id: source_id.to_string(),
            timeout,
            request_delay,
            user_agent: None,
            via_mappings: None,
        }
    }

    /// Rewrite a URL using the longest matching via prefix.
    pub fn apply_via_rewrite(&self, url: &str) -> (String, bool) {
        let matched = self
            .via_mappings
            .iter()
            .filter(|(from, _)| url.starts_with(from.as_str()))
            .max_by_key(|(from, _)| from.len());

        match matched {
            Some((from, to)) => {
                let rewritten = format!("{}{}", to, &url[from.len()..]);
                tracing::debug!("Via rewrite: {} -> {}", url, rewritten);
                (rewritten, true)
            }
            None => (url.to_string(), false),
        }
    }

    /// GET a URL. Non-2xx responses are returned, not turned into errors.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let (fetch_url, _) = self.apply_via_rewrite(url);
        let domain = self.rate_limiter.acquire(&fetch_url).await;

        let start = Instant::now();
        let response = self.client.get(&fetch_url).send().await?;
        let status = response.status();

        tracing::debug!(
            "[{}] GET {} -> {} in {:?}",
            self.source_id,
            fetch_url,
            status.as_u16(),
            start.elapsed()
        );

        if let Some(ref domain) = domain {
            self.rate_limiter.report_status(domain, status.as_u16()).await;
        }

        let headers = extract_response_headers(&response);

        Ok(HttpResponse {
            status,
            headers,
            fetched_url: fetch_url,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_via(pairs: &[(&str, &str)]) -> HttpClient {
        let via = pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        HttpClient::builder("test", Duration::from_secs(5), Duration::ZERO)
            .via(via)
            .build()
            .unwrap()
    }

    #[test]
    fn test_via_rewrite_prefix() {
        let client = client_with_via(&[("https://i.redd.it/", "http://127.0.0.1:8080/img/")]);
        assert_eq!(
            client.apply_via_rewrite("https://i.redd.it/abc123.jpg"),
            ("http://127.0.0.1:8080/img/abc123.jpg".to_string(), true)
        );
        assert_eq!(
            client.apply_via_rewrite("https://imgur.com/abc123.jpg"),
            ("https://imgur.com/abc123.jpg".to_string(), false)
        );
    }

    #[test]
    fn test_via_rewrite_prefers_longest_prefix() {
        let client = client_with_via(&[
            ("https://i.redd.it/", "http://a.local/"),
            ("https://i.redd.it/special/", "http://b.local/"),
        ]);
        assert_eq!(
            client.apply_via_rewrite("https://i.redd.it/special/x.png").0,
            "http://b.local/x.png"
        );
    }

    #[test]
    fn test_invalid_via_target_rejected() {
        let result = HttpClient::builder("test", Duration::from_secs(5), Duration::ZERO)
            .via(HashMap::from([(
                "https://i.redd.it/".to_string(),
                "ftp://mirror/".to_string(),
            )]))
            .build();
        assert!(matches!(result, Err(HttpClientError::InvalidVia { .. })));
    }
}
