//! Post records returned by the subreddit search API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Top-level body of a search response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Matching submissions. Missing `data` is treated as no results.
    #[serde(default)]
    pub data: Vec<Post>,
}

/// A single submission from the search API.
///
/// Only the fields the pipeline reads are kept; everything else in the
/// response object is ignored during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: Option<String>,
    /// Link target of the post. Image posts point at the image host.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Creation time in UNIX seconds.
    #[serde(default)]
    pub created_utc: Option<i64>,
}

impl Post {
    /// URL of the post, ignoring empty strings.
    pub fn link(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Label used in log lines.
    pub fn label(&self) -> &str {
        self.id
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or("<unknown>")
    }
}

/// Half-open `[after, before)` creation-time window, in UNIX seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub after: i64,
    pub before: i64,
}

impl TimeWindow {
    /// The day ending at `before`.
    pub fn day_ending_at(before: DateTime<Utc>) -> Self {
        Self {
            after: (before - Duration::days(1)).timestamp(),
            before: before.timestamp(),
        }
    }

    /// Shift both ends back by one day.
    pub fn previous_day(&self) -> Self {
        let day = Duration::days(1).num_seconds();
        Self {
            after: self.after - day,
            before: self.before - day,
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_ts = |ts: i64| {
            DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| ts.to_string())
        };
        write!(f, "[{}, {})", fmt_ts(self.after), fmt_ts(self.before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_ignores_unknown_fields() {
        let body = r#"{"data": [
            {"id": "a1", "url": "https://i.redd.it/abc123.jpg", "score": 5, "over_18": false},
            {"id": "a2", "selftext": "no link here"}
        ]}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].link(), Some("https://i.redd.it/abc123.jpg"));
        assert_eq!(response.data[1].link(), None);
    }

    #[test]
    fn test_parse_response_without_data() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.data.is_empty());
    }

    #[test]
    fn test_blank_url_is_no_link() {
        let post = Post {
            url: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(post.link(), None);
    }

    #[test]
    fn test_window_steps_back_one_day() {
        let window = TimeWindow {
            after: 1_000_000,
            before: 1_086_400,
        };
        let prev = window.previous_day();
        assert_eq!(prev.before, window.after);
        assert_eq!(prev.after, window.after - 86_400);
    }
}
