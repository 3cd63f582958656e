//! HTTP client for the tweet source's list-tweets endpoint.

mod fetch_all;

use std::time::Duration;

use listwatch_core::AppConfig;
use reqwest::Client;

use crate::error::SourceError;
use crate::types::{FetchWindow, ListTweetsPage};

/// Tweets per full page. A shorter page is the last one.
pub const PAGE_SIZE: usize = 20;

/// Default safety cap on pages per fetch.
pub const MAX_PAGES: usize = 50;

const LIST_TWEETS_PATH: &str = "/list-tweets";

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub timeout_secs: u64,
    pub page_delay_ms: u64,
    pub max_pages: usize,
}

impl SourceConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.source_base_url.clone(),
            api_key: config.source_api_key.clone(),
            api_key_header: config.source_api_key_header.clone(),
            timeout_secs: config.http_timeout_secs,
            page_delay_ms: config.source_page_delay_ms,
            max_pages: config.source_max_pages,
        }
    }
}

/// HTTP client for the list-tweets endpoint.
///
/// Authenticates with an API key sent in a configurable header. Maps 404 to
/// [`SourceError::NotFound`] (the end-of-pages marker), 429 to
/// [`SourceError::RateLimited`], and other non-2xx responses to
/// [`SourceError::UnexpectedStatus`]. No retries: upstream failures surface
/// to the caller.
pub struct TweetSourceClient {
    client: Client,
    config: SourceConfig,
}

impl TweetSourceClient {
    /// Creates a client with the configured per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("listwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Fetches one page of a list's tweets inside `window`. Pages are
    /// numbered from 1.
    ///
    /// # Errors
    ///
    /// - [`SourceError::MissingApiKey`] if no key is configured.
    /// - [`SourceError::NotFound`] on HTTP 404.
    /// - [`SourceError::RateLimited`] on HTTP 429.
    /// - [`SourceError::UnexpectedStatus`] on any other non-2xx status.
    /// - [`SourceError::Http`] on network or TLS failure.
    /// - [`SourceError::Deserialize`] if the body is not the expected JSON.
    pub async fn fetch_page(
        &self,
        source_list_id: &str,
        window: FetchWindow,
        page: usize,
    ) -> Result<ListTweetsPage, SourceError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(SourceError::MissingApiKey)?;
        let url = self.page_url(source_list_id, window, page)?;

        let response = self
            .client
            .get(&url)
            .header(self.config.api_key_header.as_str(), api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound { url });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(SourceError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<ListTweetsPage>(&body).map_err(|e| SourceError::Deserialize {
            context: format!("list {source_list_id} page {page}"),
            source: e,
        })
    }

    /// Builds the list-tweets URL for one page.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidBaseUrl`] if the configured base URL
    /// does not parse.
    fn page_url(
        &self,
        source_list_id: &str,
        window: FetchWindow,
        page: usize,
    ) -> Result<String, SourceError> {
        let base = format!(
            "{}{LIST_TWEETS_PATH}",
            self.config.base_url.trim_end_matches('/')
        );
        let mut url = reqwest::Url::parse(&base).map_err(|e| SourceError::InvalidBaseUrl {
            base_url: self.config.base_url.clone(),
            reason: e.to_string(),
        })?;

        url.query_pairs_mut()
            .append_pair("listId", source_list_id)
            .append_pair("since", &window.start.timestamp().to_string())
            .append_pair("until", &window.end.timestamp().to_string())
            .append_pair("page", &page.to_string());

        Ok(url.to_string())
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
