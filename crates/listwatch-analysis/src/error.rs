use listwatch_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("LLM returned no completion text")]
    EmptyCompletion,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("template validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("a template named '{0}' already exists")]
    DuplicateName(String),

    #[error("failed to parse built-in templates: {0}")]
    Defaults(#[from] serde_yaml::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("list not found: {0}")]
    ListNotFound(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("No tweets available for analysis")]
    NoTweetsAvailable,

    #[error("LLM API key is not configured")]
    LlmNotConfigured,

    /// The `processing` record could not be written; nothing else ran.
    #[error("failed to create analysis record: {0}")]
    RecordCreation(#[source] DbError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("failed to write export {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parse vocabulary: {0}")]
    Vocabulary(#[from] regex::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}
