//! In-process [`Store`] used by tests and dry runs.
//!
//! Mirrors the Postgres semantics that the pipeline relies on: tweet
//! uniqueness by external id, guarded analysis transitions, newest-first
//! ordering, and idempotent template deletion.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listwatch_core::{
    AnalysisRecord, AnalysisStatus, AnalysisTemplate, CollectedTweet, NewTweet, ScheduledTask,
    TemplateFilter, TweetSourceList, WorkerExecution,
};

use crate::{AnalysisCompletion, AnalysisFailure, DbError, Store};

#[derive(Debug, Default)]
struct Collections {
    tasks: BTreeMap<String, ScheduledTask>,
    lists: BTreeMap<String, TweetSourceList>,
    tweets: BTreeMap<String, CollectedTweet>,
    templates: BTreeMap<String, AnalysisTemplate>,
    analyses: BTreeMap<String, AnalysisRecord>,
    executions: Vec<WorkerExecution>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a task, for assertions.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<ScheduledTask> {
        self.lock().tasks.get(id).cloned()
    }

    /// Every stored tweet of a list, in no particular order.
    #[must_use]
    pub fn tweets_for_list(&self, list_id: &str) -> Vec<CollectedTweet> {
        self.lock()
            .tweets
            .values()
            .filter(|t| t.list_id == list_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn tweet_count(&self) -> usize {
        self.lock().tweets.len()
    }

    /// Execution log entries in insertion order.
    #[must_use]
    pub fn executions(&self) -> Vec<WorkerExecution> {
        self.lock().executions.clone()
    }

    /// Inserts or replaces a tweet verbatim, including its analysis state.
    pub fn put_tweet(&self, tweet: CollectedTweet) {
        self.lock().tweets.insert(tweet.tweet_id.clone(), tweet);
    }
}

fn take(items: Vec<CollectedTweet>, limit: i64) -> Vec<CollectedTweet> {
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().take(limit).collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>, DbError> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect())
    }

    async fn upsert_task(&self, task: &ScheduledTask) -> Result<(), DbError> {
        let mut c = self.lock();
        let last_executed = c.tasks.get(&task.id).and_then(|t| t.last_executed);
        let mut task = task.clone();
        task.last_executed = last_executed.or(task.last_executed);
        c.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn touch_task(&self, task_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        let mut c = self.lock();
        let task = c.tasks.get_mut(task_id).ok_or(DbError::NotFound)?;
        task.last_executed = Some(at);
        Ok(())
    }

    async fn get_list(&self, list_id: &str) -> Result<Option<TweetSourceList>, DbError> {
        Ok(self.lock().lists.get(list_id).cloned())
    }

    async fn upsert_list(&self, list: &TweetSourceList) -> Result<(), DbError> {
        self.lock()
            .lists
            .entry(list.id.clone())
            .and_modify(|existing| {
                let last_analyzed = existing.analysis.last_analyzed;
                existing.source_list_id.clone_from(&list.source_list_id);
                existing.name.clone_from(&list.name);
                existing.analysis = list.analysis.clone();
                existing.analysis.last_analyzed = last_analyzed;
            })
            .or_insert_with(|| list.clone());
        Ok(())
    }

    async fn record_list_ingest(
        &self,
        list_id: &str,
        added: i64,
        last_tweet_id: &str,
        executed_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut c = self.lock();
        let list = c.lists.get_mut(list_id).ok_or(DbError::NotFound)?;
        list.tweet_count += added;
        list.last_tweet_id = Some(last_tweet_id.to_string());
        list.last_executed = Some(executed_at);
        Ok(())
    }

    async fn set_list_last_analyzed(
        &self,
        list_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut c = self.lock();
        let list = c.lists.get_mut(list_id).ok_or(DbError::NotFound)?;
        list.analysis.last_analyzed = Some(at);
        Ok(())
    }

    async fn tweet_exists(&self, tweet_id: &str) -> Result<bool, DbError> {
        Ok(self.lock().tweets.contains_key(tweet_id))
    }

    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<Vec<String>, DbError> {
        let mut c = self.lock();
        let mut inserted = Vec::new();
        for tweet in tweets {
            if c.tweets.contains_key(&tweet.tweet_id) {
                continue;
            }
            c.tweets
                .insert(tweet.tweet_id.clone(), tweet.clone().into_collected());
            inserted.push(tweet.tweet_id.clone());
        }
        Ok(inserted)
    }

    async fn count_unanalyzed_tweets(&self, list_id: &str) -> Result<i64, DbError> {
        let count = self
            .lock()
            .tweets
            .values()
            .filter(|t| t.list_id == list_id && !t.analysis.analyzed)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn list_tweets(
        &self,
        list_id: &str,
        analyzed: bool,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError> {
        let mut matching: Vec<CollectedTweet> = self
            .lock()
            .tweets
            .values()
            .filter(|t| t.list_id == list_id && t.analysis.analyzed == analyzed)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(take(matching, limit))
    }

    async fn list_backfill_tweets(
        &self,
        list_id: &str,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError> {
        let mut matching: Vec<CollectedTweet> = self
            .lock()
            .tweets
            .values()
            .filter(|t| t.list_id == list_id && t.analysis.analyzed)
            .cloned()
            .collect();
        // None sorts before Some, matching NULLS FIRST.
        matching.sort_by(|a, b| {
            a.analysis
                .last_analyzed
                .cmp(&b.analysis.last_analyzed)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(take(matching, limit))
    }

    async fn mark_tweets_analyzed(
        &self,
        tweet_ids: &[String],
        analysis_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut c = self.lock();
        for id in tweet_ids {
            if let Some(tweet) = c.tweets.get_mut(id) {
                tweet.analysis.analyzed = true;
                tweet.analysis.analysis_ids.push(analysis_id.to_string());
                tweet.analysis.last_analyzed = Some(at);
            }
        }
        Ok(())
    }

    async fn insert_template(&self, template: &AnalysisTemplate) -> Result<(), DbError> {
        self.lock()
            .templates
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn get_template(&self, id: &str) -> Result<Option<AnalysisTemplate>, DbError> {
        Ok(self.lock().templates.get(id).cloned())
    }

    async fn find_template_by_name(
        &self,
        name: &str,
    ) -> Result<Option<AnalysisTemplate>, DbError> {
        Ok(self
            .lock()
            .templates
            .values()
            .filter(|t| t.name == name)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn list_templates(
        &self,
        filter: TemplateFilter,
    ) -> Result<Vec<AnalysisTemplate>, DbError> {
        let mut matching: Vec<AnalysisTemplate> = self
            .lock()
            .templates
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn update_template(&self, template: &AnalysisTemplate) -> Result<(), DbError> {
        let mut c = self.lock();
        let existing = c.templates.get_mut(&template.id).ok_or(DbError::NotFound)?;
        let usage = existing.usage.clone();
        let created_at = existing.created_at;
        *existing = template.clone();
        existing.usage = usage;
        existing.created_at = created_at;
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> Result<(), DbError> {
        self.lock().templates.remove(id);
        Ok(())
    }

    async fn count_templates(&self) -> Result<i64, DbError> {
        Ok(i64::try_from(self.lock().templates.len()).unwrap_or(i64::MAX))
    }

    async fn record_template_usage(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        let mut c = self.lock();
        let template = c.templates.get_mut(id).ok_or(DbError::NotFound)?;
        template.usage.total_runs += 1;
        template.usage.last_used = Some(at);
        Ok(())
    }

    async fn create_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError> {
        self.lock()
            .analyses
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn complete_analysis(
        &self,
        id: &str,
        completion: &AnalysisCompletion,
    ) -> Result<(), DbError> {
        let mut c = self.lock();
        let record = processing_record(&mut c, id)?;
        record.status = AnalysisStatus::Completed;
        record.input = Some(completion.input.clone());
        record.output = Some(completion.output.clone());
        record.summary = Some(completion.summary.clone());
        record.csv_path = Some(completion.csv_path.clone());
        record.completed_at = Some(completion.completed_at);
        record.processing_time_secs = Some(completion.processing_time_secs);
        Ok(())
    }

    async fn fail_analysis(&self, id: &str, failure: &AnalysisFailure) -> Result<(), DbError> {
        let mut c = self.lock();
        let record = processing_record(&mut c, id)?;
        record.status = AnalysisStatus::Error;
        record.error_message = Some(failure.error_message.clone());
        record.completed_at = Some(failure.completed_at);
        record.processing_time_secs = Some(failure.processing_time_secs);
        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, DbError> {
        Ok(self.lock().analyses.get(id).cloned())
    }

    async fn list_analyses(
        &self,
        list_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AnalysisRecord>, DbError> {
        let mut matching: Vec<AnalysisRecord> = self
            .lock()
            .analyses
            .values()
            .filter(|a| list_id.is_none_or(|id| a.list_id == id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        matching.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(matching)
    }

    async fn mark_analyses_notified(
        &self,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut c = self.lock();
        for id in ids {
            if let Some(record) = c.analyses.get_mut(id) {
                record.discord_notified = true;
                record.notified_at = Some(at);
            }
        }
        Ok(())
    }

    async fn record_execution(&self, execution: &WorkerExecution) -> Result<(), DbError> {
        self.lock().executions.push(execution.clone());
        Ok(())
    }
}

fn processing_record<'a>(
    c: &'a mut Collections,
    id: &str,
) -> Result<&'a mut AnalysisRecord, DbError> {
    c.analyses
        .get_mut(id)
        .filter(|r| r.status == AnalysisStatus::Processing)
        .ok_or_else(|| DbError::InvalidTransition {
            table: "ai_analysis",
            id: id.to_string(),
            expected_status: "processing",
        })
}
