//! Client for the paginated list-tweets endpoint of the tweet source, plus
//! the adapter that flattens its heterogeneous payload shapes.

pub mod client;
pub mod error;
pub mod normalize;
pub mod types;

pub use client::{SourceConfig, TweetSourceClient, MAX_PAGES, PAGE_SIZE};
pub use error::SourceError;
pub use normalize::{normalize_tweet, parse_source_timestamp};
pub use types::{FetchOutcome, FetchWindow, ListTweetsPage, SourceTweet, TweetSource};
