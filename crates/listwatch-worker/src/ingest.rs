//! Tweet ingestion: fetch a list's window from the source and store the
//! tweets not seen before.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use listwatch_core::{NewTweet, OpKind, TweetSourceList, UsageCounter};
use listwatch_db::{DbError, Store, MAX_BATCH_WRITES};
use listwatch_source::{FetchWindow, SourceTweet, TweetSource};
use serde::Serialize;

use crate::WorkerError;

/// Overlap with the previous window, absorbing clock and indexing skew.
pub const WINDOW_OVERLAP_MINUTES: i64 = 3;
/// Look-back for a list that has never been collected.
pub const FIRST_RUN_LOOKBACK_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub list_id: String,
    pub total_fetched: usize,
    pub new_tweets: u64,
    pub duplicates_skipped: usize,
    pub pages: usize,
}

/// The window to fetch for a list last collected at `last_executed`.
#[must_use]
pub fn fetch_window(last_executed: Option<DateTime<Utc>>, now: DateTime<Utc>) -> FetchWindow {
    let start = match last_executed {
        Some(last) => last - Duration::minutes(WINDOW_OVERLAP_MINUTES),
        None => now - Duration::hours(FIRST_RUN_LOOKBACK_HOURS),
    };
    FetchWindow { start, end: now }
}

/// Fetches `list` for the window ending at `now` and stores new tweets.
///
/// # Errors
///
/// Returns [`WorkerError::Source`] on any upstream failure (nothing is stored
/// in that case) or [`WorkerError::Db`] if a store call fails.
pub async fn collect_list(
    store: &dyn Store,
    source: &dyn TweetSource,
    usage: &UsageCounter,
    list: &TweetSourceList,
    task_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<IngestReport, WorkerError> {
    let window = fetch_window(list.last_executed, now);
    fetch_and_store(store, source, usage, list, task_id, window, now).await
}

/// Fetches every tweet of `list` inside `window`, inserts the new ones, and
/// advances the list counters when at least one was stored.
///
/// # Errors
///
/// See [`collect_list`].
pub async fn fetch_and_store(
    store: &dyn Store,
    source: &dyn TweetSource,
    usage: &UsageCounter,
    list: &TweetSourceList,
    task_id: Option<&str>,
    window: FetchWindow,
    now: DateTime<Utc>,
) -> Result<IngestReport, WorkerError> {
    tracing::info!(
        list_id = %list.id,
        source_list_id = %list.source_list_id,
        since = %window.start,
        until = %window.end,
        "ingest: fetching list window"
    );

    let outcome = source.fetch_window(&list.source_list_id, window).await?;
    usage.record_ops(
        OpKind::SourceRequest,
        u64::try_from(outcome.pages).unwrap_or(u64::MAX),
    );
    if outcome.unidentified > 0 {
        tracing::warn!(
            list_id = %list.id,
            count = outcome.unidentified,
            "ingest: dropped tweets without an id"
        );
    }

    let total_fetched = outcome.tweets.len();
    let new_tweets: Vec<NewTweet> = outcome
        .tweets
        .into_iter()
        .map(|t| to_new_tweet(t, list, task_id, now))
        .collect();

    let saved = save_new_tweets(store, usage, new_tweets).await?;
    let inserted = saved.inserted;

    if let Some(newest) = saved.newest_tweet_id() {
        store
            .record_list_ingest(
                &list.id,
                i64::try_from(inserted).unwrap_or(i64::MAX),
                newest,
                now,
            )
            .await?;
        usage.record_op(OpKind::StoreWrite);
    }

    tracing::info!(
        list_id = %list.id,
        total_fetched,
        new_tweets = inserted,
        duplicates = saved.duplicates,
        "ingest: list window stored"
    );

    Ok(IngestReport {
        list_id: list.id.clone(),
        total_fetched,
        new_tweets: inserted,
        duplicates_skipped: saved.duplicates,
        pages: outcome.pages,
    })
}

fn to_new_tweet(
    tweet: SourceTweet,
    list: &TweetSourceList,
    task_id: Option<&str>,
    collected_at: DateTime<Utc>,
) -> NewTweet {
    NewTweet {
        tweet_id: tweet.tweet_id,
        list_id: list.id.clone(),
        source_list_id: list.source_list_id.clone(),
        task_id: task_id.map(str::to_string),
        text: tweet.text,
        author_id: tweet.author_id,
        author_name: tweet.author_name,
        created_at: tweet.created_at.unwrap_or(collected_at),
        collected_at,
    }
}

#[derive(Debug, Default)]
struct SaveOutcome {
    inserted: u64,
    duplicates: usize,
    /// Newest tweet among the rows this run actually inserted.
    newest: Option<(DateTime<Utc>, String)>,
}

impl SaveOutcome {
    fn newest_tweet_id(&self) -> Option<&str> {
        self.newest.as_ref().map(|(_, id)| id.as_str())
    }
}

/// Inserts tweets whose id is neither stored nor earlier in this batch,
/// flushing every [`MAX_BATCH_WRITES`] rows.
async fn save_new_tweets(
    store: &dyn Store,
    usage: &UsageCounter,
    tweets: Vec<NewTweet>,
) -> Result<SaveOutcome, DbError> {
    let mut outcome = SaveOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pending: Vec<NewTweet> = Vec::with_capacity(MAX_BATCH_WRITES);

    for tweet in tweets {
        if !seen.insert(tweet.tweet_id.clone()) {
            outcome.duplicates += 1;
            continue;
        }
        usage.record_op(OpKind::StoreRead);
        if store.tweet_exists(&tweet.tweet_id).await? {
            outcome.duplicates += 1;
            continue;
        }
        pending.push(tweet);

        if pending.len() >= MAX_BATCH_WRITES {
            flush(store, usage, &mut pending, &mut outcome).await?;
        }
    }
    if !pending.is_empty() {
        flush(store, usage, &mut pending, &mut outcome).await?;
    }
    Ok(outcome)
}

async fn flush(
    store: &dyn Store,
    usage: &UsageCounter,
    pending: &mut Vec<NewTweet>,
    outcome: &mut SaveOutcome,
) -> Result<(), DbError> {
    let inserted: HashSet<String> = store.insert_tweets(pending).await?.into_iter().collect();
    usage.record_ops(
        OpKind::StoreWrite,
        u64::try_from(pending.len()).unwrap_or(u64::MAX),
    );
    tracing::debug!(batch = pending.len(), inserted = inserted.len(), "ingest: flushed batch");

    // Rows lost to a concurrent writer count as duplicates.
    for tweet in pending.drain(..) {
        if !inserted.contains(&tweet.tweet_id) {
            outcome.duplicates += 1;
            continue;
        }
        outcome.inserted += 1;
        if outcome
            .newest
            .as_ref()
            .is_none_or(|(at, _)| tweet.created_at > *at)
        {
            outcome.newest = Some((tweet.created_at, tweet.tweet_id));
        }
    }
    Ok(())
}
