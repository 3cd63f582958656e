//! Domain model and shared rules for the listwatch ingestion-and-analysis
//! pipeline.
//!
//! Everything here is I/O free apart from reading the list seed file and the
//! process environment: the store, the tweet source, the LLM, and the
//! webhook live in other crates.

pub mod analysis;
pub mod app_config;
pub mod config;
pub mod executions;
pub mod lists;
pub mod tasks;
pub mod templates;
pub mod tweets;
pub mod usage;

use thiserror::Error;

pub use analysis::{
    should_run_by_frequency, AnalysisConfig, AnalysisFrequency, AnalysisInput, AnalysisOutput,
    AnalysisRecord, AnalysisStatus, TweetSourceList,
};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use executions::{ExecutionStatus, WorkerExecution};
pub use lists::{load_lists, parse_lists, AnalysisSeed, ListSeed, ListsFile, TaskSeed};
pub use tasks::{is_task_due, ScheduledTask};
pub use templates::{
    validate_template, AnalysisTemplate, TemplateCategory, TemplateDraft, TemplateFilter,
    TemplatePatch, TemplateUsage, TEMPLATE_TWEETS_PLACEHOLDER, TEMPLATE_TWEET_COUNT_PLACEHOLDER,
};
pub use tweets::{CollectedTweet, NewTweet, TweetAnalysisState};
pub use usage::{OpKind, UsageCounter, UsageWindow};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read lists file {path}: {source}")]
    ListsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse lists file: {0}")]
    ListsFileParse(#[from] serde_yaml::Error),

    #[error("lists file validation failed: {0}")]
    Validation(String),
}
