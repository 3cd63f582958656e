use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use listwatch_core::{
    AnalysisConfig, AnalysisStatus, AnalysisTemplate, NewTweet, ScheduledTask, TemplateDraft,
    TemplateFilter, TweetAnalysisState, WorkerExecution,
};
use listwatch_db::MemoryStore;

use super::*;
use crate::error::LlmError;
use crate::llm::Completion;

const SENTIMENT_REPLY: &str = "全体的な感情傾向: ポジティブ\nポジティブ: 70%\nネガティブ: 10%\nニュートラル: 20%\n要約: X";

/// Returns a canned reply (or an API error) and remembers every request.
struct StubModel {
    reply: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubModel {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatModel for StubModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Some(text) => Ok(Completion {
                text: text.clone(),
                tokens_used: 321,
                model: "stub-model".to_string(),
            }),
            None => Err(LlmError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            }),
        }
    }
}

/// A [`MemoryStore`] with switchable write failures.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_create: bool,
    fail_marking: bool,
}

#[async_trait]
impl Store for FaultyStore {
    async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>, DbError> {
        self.inner.list_active_tasks().await
    }
    async fn upsert_task(&self, task: &ScheduledTask) -> Result<(), DbError> {
        self.inner.upsert_task(task).await
    }
    async fn touch_task(&self, task_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        self.inner.touch_task(task_id, at).await
    }
    async fn get_list(&self, list_id: &str) -> Result<Option<TweetSourceList>, DbError> {
        self.inner.get_list(list_id).await
    }
    async fn upsert_list(&self, list: &TweetSourceList) -> Result<(), DbError> {
        self.inner.upsert_list(list).await
    }
    async fn record_list_ingest(
        &self,
        list_id: &str,
        added: i64,
        last_tweet_id: &str,
        executed_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.inner
            .record_list_ingest(list_id, added, last_tweet_id, executed_at)
            .await
    }
    async fn set_list_last_analyzed(
        &self,
        list_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.inner.set_list_last_analyzed(list_id, at).await
    }
    async fn tweet_exists(&self, tweet_id: &str) -> Result<bool, DbError> {
        self.inner.tweet_exists(tweet_id).await
    }
    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<Vec<String>, DbError> {
        self.inner.insert_tweets(tweets).await
    }
    async fn count_unanalyzed_tweets(&self, list_id: &str) -> Result<i64, DbError> {
        self.inner.count_unanalyzed_tweets(list_id).await
    }
    async fn list_tweets(
        &self,
        list_id: &str,
        analyzed: bool,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError> {
        self.inner.list_tweets(list_id, analyzed, limit).await
    }
    async fn list_backfill_tweets(
        &self,
        list_id: &str,
        limit: i64,
    ) -> Result<Vec<CollectedTweet>, DbError> {
        self.inner.list_backfill_tweets(list_id, limit).await
    }
    async fn mark_tweets_analyzed(
        &self,
        tweet_ids: &[String],
        analysis_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        if self.fail_marking {
            return Err(DbError::NotFound);
        }
        self.inner.mark_tweets_analyzed(tweet_ids, analysis_id, at).await
    }
    async fn insert_template(&self, template: &AnalysisTemplate) -> Result<(), DbError> {
        self.inner.insert_template(template).await
    }
    async fn get_template(&self, id: &str) -> Result<Option<AnalysisTemplate>, DbError> {
        self.inner.get_template(id).await
    }
    async fn find_template_by_name(
        &self,
        name: &str,
    ) -> Result<Option<AnalysisTemplate>, DbError> {
        self.inner.find_template_by_name(name).await
    }
    async fn list_templates(
        &self,
        filter: TemplateFilter,
    ) -> Result<Vec<AnalysisTemplate>, DbError> {
        self.inner.list_templates(filter).await
    }
    async fn update_template(&self, template: &AnalysisTemplate) -> Result<(), DbError> {
        self.inner.update_template(template).await
    }
    async fn delete_template(&self, id: &str) -> Result<(), DbError> {
        self.inner.delete_template(id).await
    }
    async fn count_templates(&self) -> Result<i64, DbError> {
        self.inner.count_templates().await
    }
    async fn record_template_usage(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        self.inner.record_template_usage(id, at).await
    }
    async fn create_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError> {
        if self.fail_create {
            return Err(DbError::NotFound);
        }
        self.inner.create_analysis(record).await
    }
    async fn complete_analysis(
        &self,
        id: &str,
        completion: &AnalysisCompletion,
    ) -> Result<(), DbError> {
        self.inner.complete_analysis(id, completion).await
    }
    async fn fail_analysis(&self, id: &str, failure: &AnalysisFailure) -> Result<(), DbError> {
        self.inner.fail_analysis(id, failure).await
    }
    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, DbError> {
        self.inner.get_analysis(id).await
    }
    async fn list_analyses(
        &self,
        list_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AnalysisRecord>, DbError> {
        self.inner.list_analyses(list_id, limit).await
    }
    async fn mark_analyses_notified(
        &self,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.inner.mark_analyses_notified(ids, at).await
    }
    async fn record_execution(&self, execution: &WorkerExecution) -> Result<(), DbError> {
        self.inner.record_execution(execution).await
    }
}

fn list() -> TweetSourceList {
    TweetSourceList {
        id: "list-1".to_string(),
        source_list_id: "123".to_string(),
        name: "Tech".to_string(),
        tweet_count: 0,
        last_executed: None,
        last_tweet_id: None,
        analysis: AnalysisConfig::default(),
    }
}

fn options(min_tweets: i32, max_tweets: i32) -> AnalysisOptions {
    AnalysisOptions {
        frequency: listwatch_core::AnalysisFrequency::Daily,
        min_tweets,
        max_tweets,
    }
}

/// Stores `count` tweets on list-1, one minute apart, ids `{prefix}{i}`.
fn seed_tweets(store: &MemoryStore, prefix: &str, count: usize, analyzed: bool) {
    let base = Utc::now() - Duration::hours(1);
    for i in 0..count {
        let at = base + Duration::minutes(i64::try_from(i).unwrap());
        store.put_tweet(CollectedTweet {
            tweet_id: format!("{prefix}{i}"),
            list_id: "list-1".to_string(),
            source_list_id: "123".to_string(),
            task_id: None,
            text: format!("tweet {i}"),
            author_id: None,
            author_name: "alice".to_string(),
            created_at: at,
            collected_at: at,
            analysis: TweetAnalysisState {
                analyzed,
                analysis_ids: if analyzed {
                    vec!["older".to_string()]
                } else {
                    Vec::new()
                },
                last_analyzed: analyzed.then_some(at),
            },
        });
    }
}

async fn sentiment_template(store: &MemoryStore) -> String {
    templates::create_template(
        store,
        TemplateDraft {
            name: "Sentiment".to_string(),
            category: "sentiment".to_string(),
            prompt: "Analyze {{tweet_count}} tweets:\n{{tweets}}".to_string(),
            max_tokens: Some(1500),
            temperature: Some(0.3),
            ..TemplateDraft::default()
        },
    )
    .await
    .unwrap()
    .id
}

fn engine(
    store: &Arc<MemoryStore>,
    model: Option<Arc<StubModel>>,
    export_dir: &std::path::Path,
) -> AnalysisEngine {
    AnalysisEngine::new(
        Arc::clone(store) as Arc<dyn Store>,
        model.map(|m| m as Arc<dyn ChatModel>),
        export_dir.to_path_buf(),
        Arc::new(UsageCounter::new()),
    )
    .unwrap()
}

async fn only_record(store: &MemoryStore) -> AnalysisRecord {
    let records = store.list_analyses(Some("list-1"), 10).await.unwrap();
    assert_eq!(records.len(), 1, "expected exactly one analysis record");
    records.into_iter().next().unwrap()
}

// ---------------------------------------------------------------------------
// Tweet selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_tweet_below_minimum_selects_nothing() {
    let store = MemoryStore::new();
    seed_tweets(&store, "u", 1, false);

    let selected = get_analysis_target_tweets(&store, "list-1", 5, 50)
        .await
        .unwrap();
    assert!(selected.is_none());
}

#[tokio::test]
async fn unanalyzed_pool_is_capped_at_max_newest_first() {
    let store = MemoryStore::new();
    seed_tweets(&store, "u", 10, false);

    let selected = get_analysis_target_tweets(&store, "list-1", 2, 4)
        .await
        .unwrap()
        .unwrap();
    let ids: Vec<&str> = selected.iter().map(|t| t.tweet_id.as_str()).collect();
    assert_eq!(ids, vec!["u9", "u8", "u7", "u6"]);
}

#[tokio::test]
async fn short_unanalyzed_pool_is_backfilled_to_minimum() {
    let store = MemoryStore::new();
    seed_tweets(&store, "u", 2, false);
    seed_tweets(&store, "a", 5, true);

    let selected = get_analysis_target_tweets(&store, "list-1", 5, 50)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(selected.len(), 5);
    let ids: Vec<&str> = selected.iter().map(|t| t.tweet_id.as_str()).collect();
    // Least recently analyzed first for the backfill.
    assert_eq!(ids, vec!["u1", "u0", "a0", "a1", "a2"]);
}

#[test]
fn analysis_ids_are_time_based_with_lowercase_suffix() {
    let now = Utc::now();
    let id = generate_analysis_id(now);
    let prefix = format!("analysis_{}_", now.timestamp_millis());
    assert!(id.starts_with(&prefix));
    let suffix = &id[prefix.len()..];
    assert_eq!(suffix.len(), ANALYSIS_ID_SUFFIX_LEN);
    assert!(suffix
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_analysis_completes_record_and_marks_tweets() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_tweets(&store, "u", 8, false);
    let template_id = sentiment_template(&store).await;
    let model = StubModel::replying(SENTIMENT_REPLY);

    let engine = engine(&store, Some(Arc::clone(&model)), dir.path());
    let summary = engine
        .analyze(&list(), &template_id, options(5, 50))
        .await
        .unwrap();

    assert_eq!(summary.summary, "X");
    assert_eq!(summary.tweet_count, 8);
    assert_eq!(summary.tokens_used, 321);
    assert!(std::path::Path::new(&summary.csv_path).exists());

    let record = only_record(&store).await;
    assert_eq!(record.id, summary.analysis_id);
    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.summary.as_deref(), Some("X"));
    let input = record.input.unwrap();
    assert_eq!(input.tweet_count, 8);
    assert!(input.time_range_start <= input.time_range_end);
    let output = record.output.unwrap();
    assert_eq!(output.parsed["category"], "sentiment");
    assert_eq!(output.parsed["distribution"]["positive"], 70.0);
    assert_eq!(output.model, "stub-model");

    for tweet in store.tweets_for_list("list-1") {
        assert!(tweet.analysis.analyzed);
        assert_eq!(tweet.analysis.analysis_ids, vec![summary.analysis_id.clone()]);
    }

    let template = store.get_template(&template_id).await.unwrap().unwrap();
    assert_eq!(template.usage.total_runs, 1);

    let requests = model.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, SYSTEM_PROMPT);
    assert_eq!(requests[0].max_tokens, 1500);
    assert!(requests[0].prompt.starts_with("Analyze 8 tweets:\n[1] @alice"));
}

#[tokio::test]
async fn llm_failure_moves_record_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_tweets(&store, "u", 8, false);
    let template_id = sentiment_template(&store).await;

    let engine = engine(&store, Some(StubModel::failing()), dir.path());
    let err = engine
        .analyze(&list(), &template_id, options(5, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Llm(LlmError::Api { status: 500, .. })));

    let record = only_record(&store).await;
    assert_eq!(record.status, AnalysisStatus::Error);
    assert!(record
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("upstream exploded")));
    assert!(record.processing_time_secs.is_some_and(|t| t >= 0.0));

    assert!(store
        .tweets_for_list("list-1")
        .iter()
        .all(|t| !t.analysis.analyzed));
    let template = store.get_template(&template_id).await.unwrap().unwrap();
    assert_eq!(template.usage.total_runs, 0);
}

#[tokio::test]
async fn failure_marking_tweets_leaves_record_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FaultyStore {
        fail_marking: true,
        ..FaultyStore::default()
    });
    seed_tweets(&store.inner, "u", 8, false);
    let template_id = sentiment_template(&store.inner).await;

    let engine = AnalysisEngine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Some(StubModel::replying(SENTIMENT_REPLY) as Arc<dyn ChatModel>),
        dir.path().to_path_buf(),
        Arc::new(UsageCounter::new()),
    )
    .unwrap();
    let attempt = engine.run(&list(), &template_id, options(5, 50)).await;
    assert!(matches!(attempt.result, Err(AnalysisError::Db(DbError::NotFound))));

    let record = only_record(&store.inner).await;
    assert_eq!(attempt.analysis_id.as_deref(), Some(record.id.as_str()));
    assert_eq!(record.status, AnalysisStatus::Error);
    assert!(record.error_message.is_some());
    assert!(record.summary.is_none());

    assert!(store
        .inner
        .tweets_for_list("list-1")
        .iter()
        .all(|t| !t.analysis.analyzed));
    let template = store.inner.get_template(&template_id).await.unwrap().unwrap();
    assert_eq!(template.usage.total_runs, 0);
}

#[tokio::test]
async fn record_creation_failure_runs_nothing_and_has_no_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FaultyStore {
        fail_create: true,
        ..FaultyStore::default()
    });
    seed_tweets(&store.inner, "u", 8, false);
    let template_id = sentiment_template(&store.inner).await;
    let model = StubModel::replying(SENTIMENT_REPLY);

    let engine = AnalysisEngine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Some(Arc::clone(&model) as Arc<dyn ChatModel>),
        dir.path().to_path_buf(),
        Arc::new(UsageCounter::new()),
    )
    .unwrap();
    let attempt = engine.run(&list(), &template_id, options(5, 50)).await;

    assert!(attempt.analysis_id.is_none());
    assert!(matches!(attempt.result, Err(AnalysisError::RecordCreation(_))));
    assert!(store
        .inner
        .list_analyses(Some("list-1"), 10)
        .await
        .unwrap()
        .is_empty());
    assert!(model.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_run_still_reports_its_record_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_tweets(&store, "u", 8, false);
    let template_id = sentiment_template(&store).await;

    let engine = engine(&store, Some(StubModel::failing()), dir.path());
    let attempt = engine.run(&list(), &template_id, options(5, 50)).await;
    assert!(attempt.result.is_err());

    let record = only_record(&store).await;
    assert_eq!(attempt.analysis_id, Some(record.id));
}

#[tokio::test]
async fn too_few_tweets_is_a_hard_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_tweets(&store, "u", 1, false);
    let template_id = sentiment_template(&store).await;
    let model = StubModel::replying(SENTIMENT_REPLY);

    let engine = engine(&store, Some(Arc::clone(&model)), dir.path());
    let err = engine
        .analyze(&list(), &template_id, options(5, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::NoTweetsAvailable));

    let record = only_record(&store).await;
    assert_eq!(record.status, AnalysisStatus::Error);
    assert_eq!(
        record.error_message.as_deref(),
        Some("No tweets available for analysis")
    );
    assert!(model.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_template_is_recorded_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_tweets(&store, "u", 8, false);

    let engine = engine(&store, Some(StubModel::replying("ok")), dir.path());
    let err = engine
        .analyze(&list(), "missing", options(5, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::TemplateNotFound(id) if id == "missing"));
    assert_eq!(only_record(&store).await.status, AnalysisStatus::Error);
}

#[tokio::test]
async fn missing_model_is_recorded_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_tweets(&store, "u", 8, false);
    let template_id = sentiment_template(&store).await;

    let engine = engine(&store, None, dir.path());
    assert!(!engine.llm_configured());
    let err = engine
        .analyze(&list(), &template_id, options(5, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::LlmNotConfigured));
    assert_eq!(only_record(&store).await.status, AnalysisStatus::Error);
}

#[tokio::test]
async fn gate_uses_the_engine_llm_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store, None, dir.path());
    let mut list = list();
    list.analysis.enabled = true;

    let decision = engine.should_run(&list, Utc::now()).await.unwrap();
    assert_eq!(
        decision,
        GateDecision::Skip(crate::gate::SkipReason::LlmApiKeyMissing)
    );
}
