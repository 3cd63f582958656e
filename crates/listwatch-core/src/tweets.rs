//! Collected tweets (`collected_tweets`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-tweet analysis bookkeeping, owned by the analysis engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TweetAnalysisState {
    pub analyzed: bool,
    /// Ids of every analysis that included this tweet, in the order they ran.
    pub analysis_ids: Vec<String>,
    pub last_analyzed: Option<DateTime<Utc>>,
}

/// A tweet as stored, unique by `tweet_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedTweet {
    /// External tweet id.
    pub tweet_id: String,
    /// Id of the `twitter_lists` document that collected it.
    pub list_id: String,
    /// The list identifier used by the tweet source.
    pub source_list_id: String,
    pub task_id: Option<String>,
    pub text: String,
    pub author_id: Option<String>,
    pub author_name: String,
    /// Creation time reported by the tweet source.
    pub created_at: DateTime<Utc>,
    /// Local collection time.
    pub collected_at: DateTime<Utc>,
    pub analysis: TweetAnalysisState,
}

/// A tweet about to be inserted by the ingestion engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTweet {
    pub tweet_id: String,
    pub list_id: String,
    pub source_list_id: String,
    pub task_id: Option<String>,
    pub text: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
}

impl NewTweet {
    /// The stored form of this tweet, not yet analyzed.
    #[must_use]
    pub fn into_collected(self) -> CollectedTweet {
        CollectedTweet {
            tweet_id: self.tweet_id,
            list_id: self.list_id,
            source_list_id: self.source_list_id,
            task_id: self.task_id,
            text: self.text,
            author_id: self.author_id,
            author_name: self.author_name,
            created_at: self.created_at,
            collected_at: self.collected_at,
            analysis: TweetAnalysisState::default(),
        }
    }
}
