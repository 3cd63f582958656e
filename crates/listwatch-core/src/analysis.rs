//! Tweet source lists (`twitter_lists`), their embedded analysis settings,
//! and analysis records (`ai_analysis`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_TWEETS: i32 = 5;
pub const DEFAULT_MAX_TWEETS: i32 = 50;

/// How often a list may be analyzed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
    /// No cooldown: every ingestion may trigger an analysis.
    PerExecution,
    /// Any unrecognised value; treated like `Daily`.
    #[serde(other)]
    Unknown,
}

impl AnalysisFrequency {
    /// Parses a stored frequency label. Never fails: unknown labels map to
    /// [`AnalysisFrequency::Unknown`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "per_execution" => Self::PerExecution,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::PerExecution => "per_execution",
            Self::Unknown => "unknown",
        }
    }

    /// Minimum hours between two analyses, or `None` when there is no cooldown.
    #[must_use]
    pub fn cooldown_hours(self) -> Option<f64> {
        match self {
            Self::Hourly => Some(1.0),
            Self::Daily | Self::Unknown => Some(24.0),
            Self::Weekly => Some(168.0),
            Self::PerExecution => None,
        }
    }
}

impl fmt::Display for AnalysisFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` when enough time has passed since `last_analyzed` for the
/// configured `frequency`.
#[must_use]
pub fn should_run_by_frequency(
    last_analyzed: Option<DateTime<Utc>>,
    frequency: AnalysisFrequency,
    now: DateTime<Utc>,
) -> bool {
    let Some(cooldown) = frequency.cooldown_hours() else {
        return true;
    };
    let Some(last) = last_analyzed else {
        return true;
    };
    #[allow(clippy::cast_precision_loss)]
    let elapsed_hours = (now - last).num_seconds() as f64 / 3600.0;
    elapsed_hours >= cooldown
}

/// Analysis settings embedded in a list.
///
/// Lists that never configured analysis get the default, which is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub enabled: bool,
    pub template_id: Option<String>,
    pub frequency: AnalysisFrequency,
    pub min_tweets: i32,
    pub max_tweets: i32,
    /// Only advanced by a completed or errored analysis attempt on this list.
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            template_id: None,
            frequency: AnalysisFrequency::Daily,
            min_tweets: DEFAULT_MIN_TWEETS,
            max_tweets: DEFAULT_MAX_TWEETS,
            last_analyzed: None,
        }
    }
}

/// A configured tweet collection point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweetSourceList {
    pub id: String,
    /// List identifier understood by the tweet source.
    pub source_list_id: String,
    pub name: String,
    pub tweet_count: i64,
    pub last_executed: Option<DateTime<Utc>>,
    pub last_tweet_id: Option<String>,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Completed,
    Error,
}

impl AnalysisStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// What an analysis was run over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub tweet_count: usize,
    pub tweet_ids: Vec<String>,
    pub time_range_start: Option<DateTime<Utc>>,
    pub time_range_end: Option<DateTime<Utc>>,
}

/// What the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub raw_text: String,
    /// Category-specific structured result.
    pub parsed: serde_json::Value,
    pub tokens_used: i64,
    pub model: String,
}

/// Durable audit entry for one analysis attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub status: AnalysisStatus,
    pub list_id: String,
    pub template_id: String,
    pub input: Option<AnalysisInput>,
    pub output: Option<AnalysisOutput>,
    pub summary: Option<String>,
    pub csv_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_secs: Option<f64>,
    pub discord_notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    /// A fresh record in `processing` state.
    #[must_use]
    pub fn processing(
        id: impl Into<String>,
        list_id: impl Into<String>,
        template_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            status: AnalysisStatus::Processing,
            list_id: list_id.into(),
            template_id: template_id.into(),
            input: None,
            output: None,
            summary: None,
            csv_path: None,
            error_message: None,
            created_at,
            completed_at: None,
            processing_time_secs: None,
            discord_notified: false,
            notified_at: None,
        }
    }
}
