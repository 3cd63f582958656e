use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SourceError;

/// One page of the list-tweets endpoint. Tweets are kept as raw JSON and
/// flattened by [`crate::normalize_tweet`].
#[derive(Debug, Clone, Deserialize)]
pub struct ListTweetsPage {
    #[serde(default)]
    pub tweets: Vec<serde_json::Value>,
    /// Absent on sources that only signal the end with a short page.
    #[serde(default, alias = "hasNextPage")]
    pub has_next_page: Option<bool>,
}

/// Time range passed to the source as unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A tweet after field-shape normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTweet {
    pub tweet_id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_name: String,
    /// `None` when the payload carries no parseable creation time.
    pub created_at: Option<DateTime<Utc>>,
}

/// Everything fetched for one list and window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub tweets: Vec<SourceTweet>,
    /// Number of page requests that returned data or the end marker.
    pub pages: usize,
    /// Payload entries dropped because no tweet id could be found.
    pub unidentified: usize,
}

/// Source of tweets for a list, abstracted so ingestion can run against a
/// stub in tests.
#[async_trait]
pub trait TweetSource: Send + Sync {
    /// Fetches every tweet of `source_list_id` inside `window`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on any upstream failure other than the end of
    /// pages. Nothing fetched before the failure is returned.
    async fn fetch_window(
        &self,
        source_list_id: &str,
        window: FetchWindow,
    ) -> Result<FetchOutcome, SourceError>;
}
