//! Database operations for `twitter_lists`.

use chrono::{DateTime, Utc};
use listwatch_core::{AnalysisConfig, AnalysisFrequency, TweetSourceList};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `twitter_lists` table. The embedded analysis settings are
/// flattened into `analysis_*` columns.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListRow {
    pub id: String,
    pub source_list_id: String,
    pub name: String,
    pub tweet_count: i64,
    pub last_executed: Option<DateTime<Utc>>,
    pub last_tweet_id: Option<String>,
    pub analysis_enabled: bool,
    pub analysis_template_id: Option<String>,
    pub analysis_frequency: String,
    pub analysis_min_tweets: i32,
    pub analysis_max_tweets: i32,
    pub analysis_last_analyzed: Option<DateTime<Utc>>,
}

impl From<ListRow> for TweetSourceList {
    fn from(row: ListRow) -> Self {
        Self {
            id: row.id,
            source_list_id: row.source_list_id,
            name: row.name,
            tweet_count: row.tweet_count,
            last_executed: row.last_executed,
            last_tweet_id: row.last_tweet_id,
            analysis: AnalysisConfig {
                enabled: row.analysis_enabled,
                template_id: row.analysis_template_id,
                frequency: AnalysisFrequency::from_label(&row.analysis_frequency),
                min_tweets: row.analysis_min_tweets,
                max_tweets: row.analysis_max_tweets,
                last_analyzed: row.analysis_last_analyzed,
            },
        }
    }
}

/// Fetches a list by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_list(pool: &PgPool, list_id: &str) -> Result<Option<TweetSourceList>, DbError> {
    let row = sqlx::query_as::<_, ListRow>(
        "SELECT id, source_list_id, name, tweet_count, last_executed, last_tweet_id, \
                analysis_enabled, analysis_template_id, analysis_frequency, \
                analysis_min_tweets, analysis_max_tweets, analysis_last_analyzed \
         FROM twitter_lists \
         WHERE id = $1",
    )
    .bind(list_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(TweetSourceList::from))
}

/// Inserts a list or refreshes its identity and analysis settings.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_list(pool: &PgPool, list: &TweetSourceList) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO twitter_lists \
             (id, source_list_id, name, tweet_count, last_executed, last_tweet_id, \
              analysis_enabled, analysis_template_id, analysis_frequency, \
              analysis_min_tweets, analysis_max_tweets, analysis_last_analyzed) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (id) DO UPDATE SET \
             source_list_id = EXCLUDED.source_list_id, \
             name = EXCLUDED.name, \
             analysis_enabled = EXCLUDED.analysis_enabled, \
             analysis_template_id = EXCLUDED.analysis_template_id, \
             analysis_frequency = EXCLUDED.analysis_frequency, \
             analysis_min_tweets = EXCLUDED.analysis_min_tweets, \
             analysis_max_tweets = EXCLUDED.analysis_max_tweets, \
             updated_at = NOW()",
    )
    .bind(&list.id)
    .bind(&list.source_list_id)
    .bind(&list.name)
    .bind(list.tweet_count)
    .bind(list.last_executed)
    .bind(&list.last_tweet_id)
    .bind(list.analysis.enabled)
    .bind(&list.analysis.template_id)
    .bind(list.analysis.frequency.as_str())
    .bind(list.analysis.min_tweets)
    .bind(list.analysis.max_tweets)
    .bind(list.analysis.last_analyzed)
    .execute(pool)
    .await?;

    Ok(())
}

/// Increments `tweet_count` in place and records the newest tweet id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the list does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_list_ingest(
    pool: &PgPool,
    list_id: &str,
    added: i64,
    last_tweet_id: &str,
    executed_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE twitter_lists \
         SET tweet_count = tweet_count + $1, last_tweet_id = $2, last_executed = $3, \
             updated_at = NOW() \
         WHERE id = $4",
    )
    .bind(added)
    .bind(last_tweet_id)
    .bind(executed_at)
    .bind(list_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Sets `analysis_last_analyzed` on a list.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the list does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_list_last_analyzed(
    pool: &PgPool,
    list_id: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE twitter_lists SET analysis_last_analyzed = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(at)
    .bind(list_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
