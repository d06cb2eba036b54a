//! Subreddit search against a Pushshift-compatible submission endpoint.

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::HttpClient;
use crate::models::{Post, SearchResponse, TimeWindow};

pub const DEFAULT_ENDPOINT: &str = "https://api.pushshift.io/reddit/search/submission/";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid search endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },
    #[error("search request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("search API returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("could not decode search response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Parameters of one search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub endpoint: String,
    pub subreddit: String,
    /// Maximum number of posts to return.
    pub size: u32,
    pub window: Option<TimeWindow>,
}

impl SearchQuery {
    pub fn new(endpoint: &str, subreddit: &str, size: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            subreddit: subreddit.to_string(),
            size,
            window: None,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Full request URL, newest posts first.
    pub fn to_url(&self) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.endpoint).map_err(|source| FetchError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("subreddit", &self.subreddit)
                .append_pair("sort", "desc")
                .append_pair("sort_type", "created_utc")
                .append_pair("size", &self.size.to_string());
            if let Some(window) = self.window {
                pairs
                    .append_pair("after", &window.after.to_string())
                    .append_pair("before", &window.before.to_string());
            }
        }

        Ok(url)
    }
}

/// Client for the submission search endpoint.
#[derive(Clone)]
pub struct RedditSearch {
    client: HttpClient,
}

impl RedditSearch {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Fetch the posts matching a query.
    pub async fn fetch_posts(&self, query: &SearchQuery) -> Result<Vec<Post>, FetchError> {
        let url = query.to_url()?;
        debug!("Searching r/{}: {}", query.subreddit, url);

        let response = self
            .client
            .get(url.as_str())
            .await
            .map_err(FetchError::Request)?;

        if !response.is_success() {
            if response.is_rate_limited() {
                warn!("Search API is rate limiting requests (HTTP {})", response.status);
            }
            return Err(FetchError::Status {
                status: response.status.as_u16(),
                url: response.fetched_url,
            });
        }

        let body: SearchResponse = response.json().await.map_err(FetchError::Decode)?;

        match query.window {
            Some(window) => info!(
                "Fetched {} posts from r/{} in {}",
                body.data.len(),
                query.subreddit,
                window
            ),
            None => info!("Fetched {} posts from r/{}", body.data.len(), query.subreddit),
        }

        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url_without_window() {
        let url = SearchQuery::new(DEFAULT_ENDPOINT, "greentext", 10)
            .to_url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.pushshift.io/reddit/search/submission/?subreddit=greentext&sort=desc&sort_type=created_utc&size=10"
        );
    }

    #[test]
    fn test_query_url_with_window() {
        let url = SearchQuery::new("http://localhost:9000/search", "greentext", 100)
            .with_window(TimeWindow {
                after: 1_600_000_000,
                before: 1_600_086_400,
            })
            .to_url()
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("after".to_string(), "1600000000".to_string())));
        assert!(pairs.contains(&("before".to_string(), "1600086400".to_string())));
        assert!(pairs.contains(&("size".to_string(), "100".to_string())));
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = SearchQuery::new("no scheme", "greentext", 10)
            .to_url()
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidEndpoint { .. }));
    }
}
