//! Live integration tests for listwatch-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness, so they need `DATABASE_URL` and are ignored by
//! default. Run with `cargo test -p listwatch-db -- --ignored`.

use chrono::{Duration, Utc};
use listwatch_core::{
    AnalysisConfig, AnalysisFrequency, AnalysisRecord, AnalysisStatus, NewTweet, ScheduledTask,
    TweetSourceList,
};
use listwatch_db::{AnalysisFailure, PgStore, Store};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn list(id: &str) -> TweetSourceList {
    TweetSourceList {
        id: id.to_string(),
        source_list_id: format!("src-{id}"),
        name: format!("List {id}"),
        tweet_count: 0,
        last_executed: None,
        last_tweet_id: None,
        analysis: AnalysisConfig {
            enabled: true,
            template_id: Some("tpl".to_string()),
            frequency: AnalysisFrequency::Hourly,
            ..AnalysisConfig::default()
        },
    }
}

fn tweet(id: &str, list_id: &str, minutes_ago: i64) -> NewTweet {
    let now = Utc::now();
    NewTweet {
        tweet_id: id.to_string(),
        list_id: list_id.to_string(),
        source_list_id: format!("src-{list_id}"),
        task_id: Some("task".to_string()),
        text: format!("text {id}"),
        author_id: Some("42".to_string()),
        author_name: "alice".to_string(),
        created_at: now - Duration::minutes(minutes_ago),
        collected_at: now,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_tweet_ids_are_stored_once(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let batch = vec![tweet("1", "l", 2), tweet("2", "l", 1)];

    assert_eq!(store.insert_tweets(&batch).await.unwrap(), vec!["1", "2"]);
    assert!(store.insert_tweets(&batch).await.unwrap().is_empty());
    assert!(store.tweet_exists("1").await.unwrap());
    assert_eq!(store.count_unanalyzed_tweets("l").await.unwrap(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn mark_analyzed_appends_ids(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    store
        .insert_tweets(&[tweet("1", "l", 3), tweet("2", "l", 2)])
        .await
        .unwrap();
    let ids = vec!["1".to_string(), "2".to_string()];

    store.mark_tweets_analyzed(&ids, "a1", Utc::now()).await.unwrap();
    store.mark_tweets_analyzed(&ids[..1], "a2", Utc::now()).await.unwrap();

    let analyzed = store.list_tweets("l", true, 10).await.unwrap();
    assert_eq!(analyzed.len(), 2);
    let first = analyzed.iter().find(|t| t.tweet_id == "1").unwrap();
    assert_eq!(first.analysis.analysis_ids, vec!["a1", "a2"]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn list_ingest_increments_counters(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    store.upsert_list(&list("l")).await.unwrap();

    let now = Utc::now();
    store.record_list_ingest("l", 3, "t3", now).await.unwrap();
    store.record_list_ingest("l", 2, "t5", now).await.unwrap();

    let stored = store.get_list("l").await.unwrap().unwrap();
    assert_eq!(stored.tweet_count, 5);
    assert_eq!(stored.last_tweet_id.as_deref(), Some("t5"));
    assert_eq!(stored.analysis.frequency, AnalysisFrequency::Hourly);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn task_touch_and_active_filter(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    for (id, active) in [("a", true), ("b", false)] {
        store
            .upsert_task(&ScheduledTask {
                id: id.to_string(),
                name: id.to_string(),
                active,
                frequency_minutes: 15,
                last_executed: None,
                list_id: "l".to_string(),
            })
            .await
            .unwrap();
    }

    store.touch_task("a", Utc::now()).await.unwrap();
    let active = store.list_active_tasks().await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].last_executed.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_analysis_is_terminal(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let now = Utc::now();
    store
        .create_analysis(&AnalysisRecord::processing("a1", "l", "tpl", now))
        .await
        .unwrap();

    let failure = AnalysisFailure {
        error_message: "upstream 500".to_string(),
        completed_at: now,
        processing_time_secs: 0.25,
    };
    store.fail_analysis("a1", &failure).await.unwrap();
    assert!(store.fail_analysis("a1", &failure).await.is_err());

    let record = store.get_analysis("a1").await.unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Error);
    assert_eq!(record.error_message.as_deref(), Some("upstream 500"));

    let listed = store.list_analyses(Some("l"), 10).await.unwrap();
    assert_eq!(listed.len(), 1);
}
