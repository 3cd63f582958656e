//! Multi-page fetch loop for `TweetSourceClient`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::normalize::normalize_tweet;
use crate::types::{FetchOutcome, FetchWindow, TweetSource};

use super::{TweetSourceClient, PAGE_SIZE};

impl TweetSourceClient {
    /// Fetches every page of a list's tweets inside `window`.
    ///
    /// Stops after a page shorter than [`PAGE_SIZE`], a page that reports
    /// `has_next_page: false`, a 404 (the source's "no more data"), or the
    /// configured page cap. Waits `page_delay_ms` between requests (not
    /// before the first).
    ///
    /// **All-or-nothing semantics**: any other page failure discards tweets
    /// already fetched and returns the error, so nothing is persisted from a
    /// partial window.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::fetch_page`] except
    /// [`SourceError::NotFound`].
    pub async fn fetch_all_tweets(
        &self,
        source_list_id: &str,
        window: FetchWindow,
    ) -> Result<FetchOutcome, SourceError> {
        let mut outcome = FetchOutcome::default();
        let max_pages = self.config.max_pages;
        let delay_ms = self.config.page_delay_ms;

        for page in 1..=max_pages {
            if page > 1 && delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let response = match self.fetch_page(source_list_id, window, page).await {
                Ok(response) => response,
                Err(SourceError::NotFound { url }) => {
                    tracing::debug!(list = %source_list_id, page, %url, "source: no more pages");
                    outcome.pages += 1;
                    return Ok(outcome);
                }
                Err(e) => return Err(e),
            };
            outcome.pages += 1;

            let received = response.tweets.len();
            for raw in &response.tweets {
                match normalize_tweet(raw) {
                    Some(tweet) => outcome.tweets.push(tweet),
                    None => outcome.unidentified += 1,
                }
            }

            if received < PAGE_SIZE || response.has_next_page == Some(false) {
                return Ok(outcome);
            }

            if page == max_pages {
                tracing::warn!(
                    list = %source_list_id,
                    max_pages,
                    fetched = outcome.tweets.len(),
                    "source: page cap reached, stopping"
                );
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl TweetSource for TweetSourceClient {
    async fn fetch_window(
        &self,
        source_list_id: &str,
        window: FetchWindow,
    ) -> Result<FetchOutcome, SourceError> {
        self.fetch_all_tweets(source_list_id, window).await
    }
}
