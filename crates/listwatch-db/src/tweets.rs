//! Database operations for `collected_tweets`.

use chrono::{DateTime, Utc};
use listwatch_core::{CollectedTweet, NewTweet, TweetAnalysisState};
use sqlx::PgPool;

use crate::{DbError, MAX_BATCH_WRITES};

/// A row from the `collected_tweets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TweetRow {
    pub tweet_id: String,
    pub list_id: String,
    pub source_list_id: String,
    pub task_id: Option<String>,
    pub text: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub tweet_created_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    pub analyzed: bool,
    pub analysis_ids: Vec<String>,
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl From<TweetRow> for CollectedTweet {
    fn from(row: TweetRow) -> Self {
        Self {
            tweet_id: row.tweet_id,
            list_id: row.list_id,
            source_list_id: row.source_list_id,
            task_id: row.task_id,
            text: row.text,
            author_id: row.author_id,
            author_name: row.author_name,
            created_at: row.tweet_created_at,
            collected_at: row.collected_at,
            analysis: TweetAnalysisState {
                analyzed: row.analyzed,
                analysis_ids: row.analysis_ids,
                last_analyzed: row.last_analyzed,
            },
        }
    }
}

const TWEET_COLUMNS: &str = "tweet_id, list_id, source_list_id, task_id, text, author_id, \
     author_name, tweet_created_at, collected_at, analyzed, analysis_ids, last_analyzed";

/// Returns `true` if a tweet with this external id is already stored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn tweet_exists(pool: &PgPool, tweet_id: &str) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM collected_tweets WHERE tweet_id = $1)",
    )
    .bind(tweet_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Inserts tweets in a single transaction, skipping any whose `tweet_id`
/// already exists. Returns the ids of the rows inserted.
///
/// Callers are expected to chunk at [`MAX_BATCH_WRITES`]; larger slices are
/// still written, one transaction per chunk.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; the failing chunk is rolled
/// back.
pub async fn insert_tweets(pool: &PgPool, tweets: &[NewTweet]) -> Result<Vec<String>, DbError> {
    let mut inserted = Vec::new();

    for chunk in tweets.chunks(MAX_BATCH_WRITES) {
        let mut tx = pool.begin().await?;

        for tweet in chunk {
            let id = sqlx::query_scalar::<_, String>(
                "INSERT INTO collected_tweets \
                     (tweet_id, list_id, source_list_id, task_id, text, author_id, \
                      author_name, tweet_created_at, collected_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (tweet_id) DO NOTHING \
                 RETURNING tweet_id",
            )
            .bind(&tweet.tweet_id)
            .bind(&tweet.list_id)
            .bind(&tweet.source_list_id)
            .bind(&tweet.task_id)
            .bind(&tweet.text)
            .bind(&tweet.author_id)
            .bind(&tweet.author_name)
            .bind(tweet.created_at)
            .bind(tweet.collected_at)
            .fetch_optional(&mut *tx)
            .await?;

            inserted.extend(id);
        }

        tx.commit().await?;
    }

    Ok(inserted)
}

/// Counts tweets of a list that no analysis has covered yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_unanalyzed_tweets(pool: &PgPool, list_id: &str) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM collected_tweets WHERE list_id = $1 AND analyzed = false",
    )
    .bind(list_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Returns up to `limit` tweets of a list with the given `analyzed` flag,
/// newest first by source creation time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tweets(
    pool: &PgPool,
    list_id: &str,
    analyzed: bool,
    limit: i64,
) -> Result<Vec<CollectedTweet>, DbError> {
    let rows = sqlx::query_as::<_, TweetRow>(&format!(
        "SELECT {TWEET_COLUMNS} FROM collected_tweets \
         WHERE list_id = $1 AND analyzed = $2 \
         ORDER BY tweet_created_at DESC, id DESC \
         LIMIT $3"
    ))
    .bind(list_id)
    .bind(analyzed)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CollectedTweet::from).collect())
}

/// Returns up to `limit` analyzed tweets of a list, least recently analyzed
/// first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_backfill_tweets(
    pool: &PgPool,
    list_id: &str,
    limit: i64,
) -> Result<Vec<CollectedTweet>, DbError> {
    let rows = sqlx::query_as::<_, TweetRow>(&format!(
        "SELECT {TWEET_COLUMNS} FROM collected_tweets \
         WHERE list_id = $1 AND analyzed = true \
         ORDER BY last_analyzed ASC NULLS FIRST, tweet_created_at DESC \
         LIMIT $2"
    ))
    .bind(list_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CollectedTweet::from).collect())
}

/// Flags tweets as analyzed and appends `analysis_id` to each, in one
/// statement.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_tweets_analyzed(
    pool: &PgPool,
    tweet_ids: &[String],
    analysis_id: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    if tweet_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "UPDATE collected_tweets \
         SET analyzed = true, \
             analysis_ids = array_append(analysis_ids, $1), \
             last_analyzed = $2 \
         WHERE tweet_id = ANY($3)",
    )
    .bind(analysis_id)
    .bind(at)
    .bind(tweet_ids)
    .execute(pool)
    .await?;

    Ok(())
}
