//! LLM analysis of collected tweets: the template registry, the eligibility
//! gate, prompt rendering, response parsing, CSV export, and the engine that
//! ties them together.

pub mod engine;
pub mod error;
pub mod export;
pub mod gate;
pub mod llm;
pub mod parse;
pub mod prompt;
pub mod templates;

pub use engine::{
    generate_analysis_id, get_analysis_target_tweets, AnalysisAttempt, AnalysisEngine,
    AnalysisSummary,
};
pub use error::{AnalysisError, LlmError, TemplateError};
pub use gate::{should_run_analysis, AnalysisOptions, GateDecision, SkipReason};
pub use llm::{ChatModel, Completion, CompletionRequest, LlmConfig, OpenAiClient, SYSTEM_PROMPT};
pub use parse::{ParseVocabulary, ParsedAnalysis, ResponseParser, SentimentDistribution};
pub use templates::DeleteAck;
