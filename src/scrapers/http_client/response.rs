//! HTTP response wrapper.

use std::collections::HashMap;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    /// URL the request was actually sent to (after via rewriting).
    pub fetched_url: String,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the server asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status.as_u16(), 429 | 503)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|s| s.parse().ok())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, reqwest::Error> {
        self.response.json().await
    }

    /// Consume the response as a stream of body chunks.
    pub fn into_stream(self) -> BodyStream {
        Box::pin(self.response.bytes_stream())
    }
}
