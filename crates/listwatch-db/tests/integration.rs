//! Offline unit tests for listwatch-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::Utc;
use listwatch_core::{
    AnalysisFrequency, AnalysisStatus, AppConfig, AnalysisRecord, Environment, ScheduledTask,
    TemplateCategory, TweetSourceList,
};
use listwatch_db::{
    analyses::AnalysisRow, lists::ListRow, tasks::TaskRow, templates::TemplateRow, DbError,
    PoolConfig,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        lists_path: PathBuf::from("./config/lists.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        source_base_url: "https://source.example".to_string(),
        source_api_key: None,
        source_api_key_header: "x-api-key".to_string(),
        source_page_delay_ms: 0,
        source_max_pages: 5,
        llm_base_url: "https://llm.example".to_string(),
        llm_api_key: None,
        llm_model: "model".to_string(),
        http_timeout_secs: 30,
        discord_webhook_url: None,
        export_dir: PathBuf::from("./exports"),
        cycle_cron: "0 * * * * *".to_string(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn task_row_converts_to_domain() {
    let row = TaskRow {
        id: "collect-tech".to_string(),
        name: "Collect Tech".to_string(),
        active: true,
        frequency_minutes: 60,
        last_executed: None,
        list_id: "tech".to_string(),
    };

    let task = ScheduledTask::from(row);
    assert_eq!(task.id, "collect-tech");
    assert_eq!(task.frequency_minutes, 60);
    assert_eq!(task.list_id, "tech");
}

#[test]
fn list_row_with_unknown_frequency_maps_to_unknown() {
    let row = ListRow {
        id: "tech".to_string(),
        source_list_id: "1001".to_string(),
        name: "Tech".to_string(),
        tweet_count: 12,
        last_executed: None,
        last_tweet_id: Some("99".to_string()),
        analysis_enabled: true,
        analysis_template_id: Some("tpl".to_string()),
        analysis_frequency: "fortnightly".to_string(),
        analysis_min_tweets: 5,
        analysis_max_tweets: 50,
        analysis_last_analyzed: None,
    };

    let list = TweetSourceList::from(row);
    assert_eq!(list.analysis.frequency, AnalysisFrequency::Unknown);
    assert_eq!(list.tweet_count, 12);
    assert!(list.analysis.enabled);
}

#[test]
fn template_row_with_bad_category_is_corrupt() {
    let now = Utc::now();
    let row = TemplateRow {
        id: "tpl".to_string(),
        name: "n".to_string(),
        description: None,
        category: "poetry".to_string(),
        prompt: "{{tweets}}".to_string(),
        max_tokens: 1000,
        temperature: 0.5,
        active: true,
        total_runs: 3,
        last_used: None,
        created_at: now,
        updated_at: now,
    };

    let err = listwatch_core::AnalysisTemplate::try_from(row.clone()).unwrap_err();
    assert!(matches!(err, DbError::CorruptRow { .. }));

    let good = TemplateRow {
        category: "trend".to_string(),
        ..row
    };
    let template = listwatch_core::AnalysisTemplate::try_from(good).unwrap();
    assert_eq!(template.category, TemplateCategory::Trend);
    assert_eq!(template.usage.total_runs, 3);
}

#[test]
fn analysis_row_converts_status() {
    let row = AnalysisRow {
        id: "a1".to_string(),
        status: "completed".to_string(),
        list_id: "tech".to_string(),
        template_id: "tpl".to_string(),
        input: None,
        output: None,
        summary: Some("ok".to_string()),
        csv_path: None,
        error_message: None,
        created_at: Utc::now(),
        completed_at: None,
        processing_time_secs: Some(1.5),
        discord_notified: false,
        notified_at: None,
    };

    let record = AnalysisRecord::try_from(row).unwrap();
    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.summary.as_deref(), Some("ok"));
}
