//! Network side of the pipeline: the HTTP client, its rate limiter and the
//! subreddit search source.

mod http_client;
pub mod rate_limiter;
pub mod reddit;

pub use http_client::{BodyStream, HttpClient, HttpClientBuilder, HttpClientError, HttpResponse};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use reddit::{FetchError, RedditSearch, SearchQuery, DEFAULT_ENDPOINT};
