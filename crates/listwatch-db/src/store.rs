//! The document-store seam used by ingestion, analysis, and scheduling.
//!
//! [`PgStore`] is the production implementation and delegates to the
//! per-table free functions in this crate. [`crate::MemoryStore`] backs tests
//! and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listwatch_core::{
    AnalysisInput, AnalysisOutput, AnalysisRecord, AnalysisTemplate, CollectedTweet, NewTweet,
    ScheduledTask, TemplateFilter, TweetSourceList, WorkerExecution,
};
use sqlx::PgPool;

use crate::{analyses, executions, lists, tasks, templates, tweets, DbError};

/// Fields written when an analysis reaches `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisCompletion {
    pub input: AnalysisInput,
    pub output: AnalysisOutput,
    pub summary: String,
    pub csv_path: String,
    pub completed_at: DateTime<Utc>,
    pub processing_time_secs: f64,
}

/// Fields written when an analysis reaches `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFailure {
    pub error_message: String,
    pub completed_at: DateTime<Utc>,
    pub processing_time_secs: f64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // cron_tasks
    async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>, DbError>;
    async fn upsert_task(&self, task: &ScheduledTask) -> Result<(), DbError>;
    /// Sets `last_executed` on a task.
    async fn touch_task(&self, task_id: &str, at: DateTime<Utc>) -> Result<(), DbError>;

    // twitter_lists
    async fn get_list(&self, list_id: &str) -> Result<Option<TweetSourceList>, DbError>;
    /// Inserts a list or updates its identity and analysis settings. Counters
    /// and `last_analyzed` of an existing list are preserved.
    async fn upsert_list(&self, list: &TweetSourceList) -> Result<(), DbError>;
    /// Adds `added` to the list's tweet count and records the newest tweet id
    /// and execution time.
    async fn record_list_ingest(
        &self,
        list_id: &str,
        added: i64,
        last_tweet_id: &str,
        executed_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
    async fn set_list_last_analyzed(&self, list_id: &str, at: DateTime<Utc>)
        -> Result<(), DbError>;

    // collected_tweets
    async fn tweet_exists(&self, tweet_id: &str) -> Result<bool, DbError>;
    /// Inserts tweets whose `tweet_id` is not yet stored, in one transaction.
    /// Returns the ids of the rows actually inserted.
    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<Vec<String>, DbError>;
    async fn count_unanalyzed_tweets(&self, list_id: &str) -> Result<i64, DbError>;
    /// Tweets of a list with the given analyzed flag, newest first.
    async fn list_tweets(
        &self,
        list_id: &str,
        analyzed: bool,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError>;
    /// Already-analyzed tweets of a list, least recently analyzed first.
    async fn list_backfill_tweets(
        &self,
        list_id: &str,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError>;
    async fn mark_tweets_analyzed(
        &self,
        tweet_ids: &[String],
        analysis_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    // analysis_templates
    async fn insert_template(&self, template: &AnalysisTemplate) -> Result<(), DbError>;
    async fn get_template(&self, id: &str) -> Result<Option<AnalysisTemplate>, DbError>;
    async fn find_template_by_name(&self, name: &str)
        -> Result<Option<AnalysisTemplate>, DbError>;
    async fn list_templates(&self, filter: TemplateFilter)
        -> Result<Vec<AnalysisTemplate>, DbError>;
    /// Replaces every editable field of an existing template.
    async fn update_template(&self, template: &AnalysisTemplate) -> Result<(), DbError>;
    /// Deletes a template. Deleting an absent id is not an error.
    async fn delete_template(&self, id: &str) -> Result<(), DbError>;
    async fn count_templates(&self) -> Result<i64, DbError>;
    async fn record_template_usage(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError>;

    // ai_analysis
    async fn create_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError>;
    /// Moves a `processing` analysis to `completed`.
    async fn complete_analysis(
        &self,
        id: &str,
        completion: &AnalysisCompletion,
    ) -> Result<(), DbError>;
    /// Moves a `processing` analysis to `error`.
    async fn fail_analysis(&self, id: &str, failure: &AnalysisFailure) -> Result<(), DbError>;
    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, DbError>;
    /// Newest first, optionally restricted to one list.
    async fn list_analyses(
        &self,
        list_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AnalysisRecord>, DbError>;
    async fn mark_analyses_notified(&self, ids: &[String], at: DateTime<Utc>)
        -> Result<(), DbError>;

    // worker_executions
    async fn record_execution(&self, execution: &WorkerExecution) -> Result<(), DbError>;
}

/// [`Store`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>, DbError> {
        tasks::list_active_tasks(&self.pool).await
    }

    async fn upsert_task(&self, task: &ScheduledTask) -> Result<(), DbError> {
        tasks::upsert_task(&self.pool, task).await
    }

    async fn touch_task(&self, task_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        tasks::touch_task(&self.pool, task_id, at).await
    }

    async fn get_list(&self, list_id: &str) -> Result<Option<TweetSourceList>, DbError> {
        lists::get_list(&self.pool, list_id).await
    }

    async fn upsert_list(&self, list: &TweetSourceList) -> Result<(), DbError> {
        lists::upsert_list(&self.pool, list).await
    }

    async fn record_list_ingest(
        &self,
        list_id: &str,
        added: i64,
        last_tweet_id: &str,
        executed_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        lists::record_list_ingest(&self.pool, list_id, added, last_tweet_id, executed_at).await
    }

    async fn set_list_last_analyzed(
        &self,
        list_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        lists::set_list_last_analyzed(&self.pool, list_id, at).await
    }

    async fn tweet_exists(&self, tweet_id: &str) -> Result<bool, DbError> {
        tweets::tweet_exists(&self.pool, tweet_id).await
    }

    async fn insert_tweets(&self, new_tweets: &[NewTweet]) -> Result<Vec<String>, DbError> {
        tweets::insert_tweets(&self.pool, new_tweets).await
    }

    async fn count_unanalyzed_tweets(&self, list_id: &str) -> Result<i64, DbError> {
        tweets::count_unanalyzed_tweets(&self.pool, list_id).await
    }

    async fn list_tweets(
        &self,
        list_id: &str,
        analyzed: bool,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError> {
        tweets::list_tweets(&self.pool, list_id, analyzed, limit).await
    }

    async fn list_backfill_tweets(
        &self,
        list_id: &str,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError> {
        tweets::list_backfill_tweets(&self.pool, list_id, limit).await
    }

    async fn mark_tweets_analyzed(
        &self,
        tweet_ids: &[String],
        analysis_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        tweets::mark_tweets_analyzed(&self.pool, tweet_ids, analysis_id, at).await
    }

    async fn insert_template(&self, template: &AnalysisTemplate) -> Result<(), DbError> {
        templates::insert_template(&self.pool, template).await
    }

    async fn get_template(&self, id: &str) -> Result<Option<AnalysisTemplate>, DbError> {
        templates::get_template(&self.pool, id).await
    }

    async fn find_template_by_name(
        &self,
        name: &str,
    ) -> Result<Option<AnalysisTemplate>, DbError> {
        templates::find_template_by_name(&self.pool, name).await
    }

    async fn list_templates(
        &self,
        filter: TemplateFilter,
    ) -> Result<Vec<AnalysisTemplate>, DbError> {
        templates::list_templates(&self.pool, filter).await
    }

    async fn update_template(&self, template: &AnalysisTemplate) -> Result<(), DbError> {
        templates::update_template(&self.pool, template).await
    }

    async fn delete_template(&self, id: &str) -> Result<(), DbError> {
        templates::delete_template(&self.pool, id).await
    }

    async fn count_templates(&self) -> Result<i64, DbError> {
        templates::count_templates(&self.pool).await
    }

    async fn record_template_usage(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        templates::record_template_usage(&self.pool, id, at).await
    }

    async fn create_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError> {
        analyses::create_analysis(&self.pool, record).await
    }

    async fn complete_analysis(
        &self,
        id: &str,
        completion: &AnalysisCompletion,
    ) -> Result<(), DbError> {
        analyses::complete_analysis(&self.pool, id, completion).await
    }

    async fn fail_analysis(&self, id: &str, failure: &AnalysisFailure) -> Result<(), DbError> {
        analyses::fail_analysis(&self.pool, id, failure).await
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, DbError> {
        analyses::get_analysis(&self.pool, id).await
    }

    async fn list_analyses(
        &self,
        list_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AnalysisRecord>, DbError> {
        analyses::list_analyses(&self.pool, list_id, limit).await
    }

    async fn mark_analyses_notified(
        &self,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        analyses::mark_analyses_notified(&self.pool, ids, at).await
    }

    async fn record_execution(&self, execution: &WorkerExecution) -> Result<(), DbError> {
        executions::record_execution(&self.pool, execution).await
    }
}
