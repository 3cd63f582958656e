//! Eligibility gate: decides whether a list gets a new analysis run.

use chrono::{DateTime, Utc};
use listwatch_core::{should_run_by_frequency, AnalysisFrequency, TweetSourceList};
use listwatch_db::{DbError, Store};
use serde::Serialize;

/// Why the gate declined to start an analysis. Checks run in declaration
/// order and the first failing one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AnalysisDisabled,
    LlmApiKeyMissing,
    TemplateNotConfigured,
    TemplateNotFound,
    FrequencyCooldown,
    InsufficientTweets,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalysisDisabled => "analysis_disabled",
            Self::LlmApiKeyMissing => "llm_api_key_missing",
            Self::TemplateNotConfigured => "template_not_configured",
            Self::TemplateNotFound => "template_not_found",
            Self::FrequencyCooldown => "frequency_cooldown",
            Self::InsufficientTweets => "insufficient_tweets",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-size options handed from the gate to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisOptions {
    pub frequency: AnalysisFrequency,
    pub min_tweets: i32,
    pub max_tweets: i32,
}

impl AnalysisOptions {
    #[must_use]
    pub fn for_list(list: &TweetSourceList) -> Self {
        Self {
            frequency: list.analysis.frequency,
            min_tweets: list.analysis.min_tweets,
            max_tweets: list.analysis.max_tweets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run {
        template_id: String,
        options: AnalysisOptions,
    },
    Skip(SkipReason),
}

impl GateDecision {
    #[must_use]
    pub fn should_run(&self) -> bool {
        matches!(self, Self::Run { .. })
    }
}

/// Runs the gate checks for `list`.
///
/// `llm_configured` reports whether an LLM credential is available.
///
/// # Errors
///
/// Returns [`DbError`] if the template lookup or the unanalyzed-tweet count
/// fails. A missing template is a [`SkipReason`], not an error.
pub async fn should_run_analysis(
    store: &dyn Store,
    list: &TweetSourceList,
    llm_configured: bool,
    now: DateTime<Utc>,
) -> Result<GateDecision, DbError> {
    let config = &list.analysis;

    if !config.enabled {
        return Ok(GateDecision::Skip(SkipReason::AnalysisDisabled));
    }
    if !llm_configured {
        return Ok(GateDecision::Skip(SkipReason::LlmApiKeyMissing));
    }
    let Some(template_id) = config.template_id.as_deref().filter(|id| !id.is_empty()) else {
        return Ok(GateDecision::Skip(SkipReason::TemplateNotConfigured));
    };
    if store.get_template(template_id).await?.is_none() {
        return Ok(GateDecision::Skip(SkipReason::TemplateNotFound));
    }
    if !should_run_by_frequency(config.last_analyzed, config.frequency, now) {
        return Ok(GateDecision::Skip(SkipReason::FrequencyCooldown));
    }

    let unanalyzed = store.count_unanalyzed_tweets(&list.id).await?;
    if unanalyzed < i64::from(config.min_tweets) {
        tracing::debug!(
            list_id = %list.id,
            unanalyzed,
            min_tweets = config.min_tweets,
            "analysis: not enough unanalyzed tweets"
        );
        return Ok(GateDecision::Skip(SkipReason::InsufficientTweets));
    }

    Ok(GateDecision::Run {
        template_id: template_id.to_string(),
        options: AnalysisOptions::for_list(list),
    })
}
