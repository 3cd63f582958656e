//! The analysis pipeline: select tweets, prompt the model, parse, export,
//! and record the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use listwatch_core::{
    AnalysisInput, AnalysisOutput, AnalysisRecord, CollectedTweet, OpKind, TweetSourceList,
    UsageCounter,
};
use listwatch_db::{AnalysisCompletion, AnalysisFailure, DbError, Store};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::export::{write_export, ExportContext};
use crate::gate::{should_run_analysis, AnalysisOptions, GateDecision};
use crate::llm::{ChatModel, CompletionRequest, SYSTEM_PROMPT};
use crate::parse::{ParseVocabulary, ResponseParser};
use crate::prompt::render_prompt;
use crate::templates;

const ANALYSIS_ID_SUFFIX_LEN: usize = 6;

/// Result of one completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub analysis_id: String,
    pub summary: String,
    pub csv_path: String,
    pub tweet_count: usize,
    pub tokens_used: i64,
}

/// One call to [`AnalysisEngine::run`].
///
/// `analysis_id` is `None` only when the initial record could not be
/// written; otherwise it names a record that ended `completed` or `error`.
#[derive(Debug)]
pub struct AnalysisAttempt {
    pub analysis_id: Option<String>,
    pub result: Result<AnalysisSummary, AnalysisError>,
}

/// `analysis_{unix_millis}_{6 lowercase alphanumerics}`.
#[must_use]
pub fn generate_analysis_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(ANALYSIS_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("analysis_{}_{suffix}", now.timestamp_millis())
}

/// Picks the batch to analyze: unanalyzed tweets newest first up to
/// `max_tweets`, topped up with the least recently analyzed tweets when fewer
/// than `min_tweets` are unanalyzed.
///
/// Returns `None` when even the backfilled pool is below `min_tweets`, or
/// when there is nothing at all to analyze.
///
/// # Errors
///
/// Returns [`DbError`] if a store query fails.
pub async fn get_analysis_target_tweets(
    store: &dyn Store,
    list_id: &str,
    min_tweets: i32,
    max_tweets: i32,
) -> Result<Option<Vec<CollectedTweet>>, DbError> {
    let min = usize::try_from(min_tweets).unwrap_or(0);
    let mut selected = store
        .list_tweets(list_id, false, i64::from(max_tweets.max(1)))
        .await?;

    if selected.len() < min {
        let needed = i64::try_from(min - selected.len()).unwrap_or(i64::MAX);
        let backfill = store.list_backfill_tweets(list_id, needed).await?;
        tracing::debug!(
            list_id,
            unanalyzed = selected.len(),
            backfill = backfill.len(),
            "analysis: topping up batch with analyzed tweets"
        );
        selected.extend(backfill);
    }

    if selected.is_empty() || selected.len() < min {
        return Ok(None);
    }
    Ok(Some(selected))
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_secs(started: Instant) -> f64 {
    started.elapsed().as_millis() as f64 / 1000.0
}

pub struct AnalysisEngine {
    store: Arc<dyn Store>,
    model: Option<Arc<dyn ChatModel>>,
    export_dir: PathBuf,
    parser: ResponseParser,
    usage: Arc<UsageCounter>,
}

impl AnalysisEngine {
    /// Builds an engine with the default parse vocabulary. `model` is `None`
    /// when no LLM credential is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Vocabulary`] if the default vocabulary fails
    /// to compile.
    pub fn new(
        store: Arc<dyn Store>,
        model: Option<Arc<dyn ChatModel>>,
        export_dir: PathBuf,
        usage: Arc<UsageCounter>,
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            store,
            model,
            export_dir,
            parser: ResponseParser::new(&ParseVocabulary::default())?,
            usage,
        })
    }

    #[must_use]
    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn llm_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Runs the eligibility gate for `list` with this engine's LLM state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a gate lookup fails.
    pub async fn should_run(
        &self,
        list: &TweetSourceList,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, DbError> {
        self.usage.record_ops(OpKind::StoreRead, 2);
        should_run_analysis(self.store.as_ref(), list, self.llm_configured(), now).await
    }

    /// Analyzes a batch of `list`'s tweets with `template_id`.
    ///
    /// A `processing` record is written before anything else; every later
    /// failure moves it to `error` and is returned to the caller.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::RecordCreation`] if the initial record cannot be
    ///   written. Nothing else runs in that case.
    /// - Any stage error from tweet selection through completing the record.
    pub async fn analyze(
        &self,
        list: &TweetSourceList,
        template_id: &str,
        options: AnalysisOptions,
    ) -> Result<AnalysisSummary, AnalysisError> {
        self.run(list, template_id, options).await.result
    }

    /// Same as [`Self::analyze`], but also reports the id of the record it
    /// wrote, which failed runs need for notification bookkeeping.
    pub async fn run(
        &self,
        list: &TweetSourceList,
        template_id: &str,
        options: AnalysisOptions,
    ) -> AnalysisAttempt {
        let started = Instant::now();
        let created_at = Utc::now();
        let analysis_id = generate_analysis_id(created_at);

        let record = AnalysisRecord::processing(&analysis_id, &list.id, template_id, created_at);
        if let Err(e) = self.store.create_analysis(&record).await {
            tracing::error!(list_id = %list.id, error = %e, "analysis: failed to create record");
            return AnalysisAttempt {
                analysis_id: None,
                result: Err(AnalysisError::RecordCreation(e)),
            };
        }
        self.usage.record_op(OpKind::StoreWrite);

        tracing::info!(
            analysis_id = %analysis_id,
            list_id = %list.id,
            template_id,
            "analysis: started"
        );

        match self
            .run_pipeline(&analysis_id, list, template_id, options, started)
            .await
        {
            Ok(summary) => {
                if let Err(e) = templates::increment_usage(self.store.as_ref(), template_id).await
                {
                    tracing::warn!(template_id, error = %e, "analysis: failed to record template usage");
                }
                self.usage.record_op(OpKind::StoreWrite);
                tracing::info!(
                    analysis_id = %analysis_id,
                    tweet_count = summary.tweet_count,
                    tokens_used = summary.tokens_used,
                    "analysis: completed"
                );
                AnalysisAttempt {
                    analysis_id: Some(analysis_id),
                    result: Ok(summary),
                }
            }
            Err(e) => {
                let failure = AnalysisFailure {
                    error_message: e.to_string(),
                    completed_at: Utc::now(),
                    processing_time_secs: elapsed_secs(started),
                };
                if let Err(db) = self.store.fail_analysis(&analysis_id, &failure).await {
                    tracing::error!(
                        analysis_id = %analysis_id,
                        error = %db,
                        "analysis: failed to record error status"
                    );
                }
                self.usage.record_op(OpKind::StoreWrite);
                tracing::error!(analysis_id = %analysis_id, error = %e, "analysis: failed");
                AnalysisAttempt {
                    analysis_id: Some(analysis_id),
                    result: Err(e),
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        analysis_id: &str,
        list: &TweetSourceList,
        template_id: &str,
        options: AnalysisOptions,
        started: Instant,
    ) -> Result<AnalysisSummary, AnalysisError> {
        let tweets = get_analysis_target_tweets(
            self.store.as_ref(),
            &list.id,
            options.min_tweets,
            options.max_tweets,
        )
        .await?
        .ok_or(AnalysisError::NoTweetsAvailable)?;
        self.usage.record_op(OpKind::StoreRead);

        let template = self
            .store
            .get_template(template_id)
            .await?
            .ok_or_else(|| AnalysisError::TemplateNotFound(template_id.to_string()))?;
        self.usage.record_op(OpKind::StoreRead);

        let model = self.model.as_ref().ok_or(AnalysisError::LlmNotConfigured)?;
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: render_prompt(&template.prompt, &tweets),
            max_tokens: template.max_tokens,
            temperature: template.temperature,
        };
        self.usage.record_op(OpKind::LlmRequest);
        let completion = model.complete(&request).await?;

        let parsed = self.parser.parse(&completion.text, template.category);
        let summary = parsed.summary().to_string();

        let completed_at = Utc::now();
        let csv_path = write_export(
            &self.export_dir,
            &list.id,
            analysis_id,
            &tweets,
            &ExportContext {
                list_name: &list.name,
                category: template.category,
                parsed: &parsed,
                exported_at: completed_at,
            },
        )
        .await?
        .display()
        .to_string();

        let tweet_ids: Vec<String> = tweets.iter().map(|t| t.tweet_id.clone()).collect();
        let completion_fields = AnalysisCompletion {
            input: AnalysisInput {
                tweet_count: tweets.len(),
                tweet_ids: tweet_ids.clone(),
                time_range_start: tweets.iter().map(|t| t.created_at).min(),
                time_range_end: tweets.iter().map(|t| t.created_at).max(),
            },
            output: AnalysisOutput {
                raw_text: completion.text,
                parsed: serde_json::to_value(&parsed).unwrap_or_default(),
                tokens_used: completion.tokens_used,
                model: completion.model,
            },
            summary: summary.clone(),
            csv_path: csv_path.clone(),
            completed_at,
            processing_time_secs: elapsed_secs(started),
        };
        // The record must still be `processing` if marking fails.
        self.store
            .mark_tweets_analyzed(&tweet_ids, analysis_id, completed_at)
            .await?;
        self.store
            .complete_analysis(analysis_id, &completion_fields)
            .await?;
        self.usage.record_ops(OpKind::StoreWrite, 2);

        Ok(AnalysisSummary {
            analysis_id: analysis_id.to_string(),
            summary,
            csv_path,
            tweet_count: tweets.len(),
            tokens_used: completion_fields.output.tokens_used,
        })
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
