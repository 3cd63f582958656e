use listwatch_analysis::{AnalysisError, TemplateError};
use listwatch_db::DbError;
use listwatch_source::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("list not found: {0}")]
    ListNotFound(String),

    #[error("list '{0}' has no analysis template configured")]
    TemplateNotConfigured(String),

    #[error("invalid job data: {0}")]
    InvalidJobData(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to serialize job result: {0}")]
    Serialize(#[from] serde_json::Error),
}
