//! One scheduling cycle: run every due task, analyze the lists those tasks
//! refreshed, then send a single notification covering all of it.

use chrono::{DateTime, Utc};
use listwatch_analysis::{GateDecision, SkipReason};
use listwatch_core::{is_task_due, OpKind, ScheduledTask, TweetSourceList};
use serde::Serialize;

use crate::context::WorkerContext;
use crate::ingest::{collect_list, IngestReport};
use crate::notify::build_cycle_embed;
use crate::WorkerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: String,
    pub task_name: String,
    pub list_id: String,
    pub success: bool,
    pub new_tweets: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub list_id: String,
    pub list_name: String,
    pub success: bool,
    pub analysis_id: Option<String>,
    pub tweet_count: usize,
    pub tokens_used: i64,
    pub summary: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedAnalysis {
    pub list_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Due tasks attempted, successful or not.
    pub executed_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub tasks: Vec<TaskOutcome>,
    pub analyses: Vec<AnalysisOutcome>,
    pub skipped_analyses: Vec<SkippedAnalysis>,
    pub notified: bool,
}

/// Runs one cycle at `now`.
///
/// Per-task and per-list failures are recorded in the report and never
/// abort the cycle.
///
/// # Errors
///
/// Returns [`WorkerError::Db`] only if the active task list cannot be loaded.
pub async fn run_cycle(ctx: &WorkerContext, now: DateTime<Utc>) -> Result<CycleReport, WorkerError> {
    let tasks = ctx.store.list_active_tasks().await?;
    ctx.usage.record_op(OpKind::StoreRead);

    let due: Vec<ScheduledTask> = tasks.into_iter().filter(|t| is_task_due(t, now)).collect();
    tracing::info!(due = due.len(), "scheduler: cycle started");

    let mut report = CycleReport::default();
    let mut refreshed_lists: Vec<String> = Vec::new();

    for task in &due {
        let outcome = match execute_task(ctx, task, now).await {
            Ok(ingest) => {
                if !refreshed_lists.contains(&task.list_id) {
                    refreshed_lists.push(task.list_id.clone());
                }
                TaskOutcome {
                    task_id: task.id.clone(),
                    task_name: task.name.clone(),
                    list_id: task.list_id.clone(),
                    success: true,
                    new_tweets: ingest.new_tweets,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, list_id = %task.list_id, error = %e, "scheduler: task failed");
                TaskOutcome {
                    task_id: task.id.clone(),
                    task_name: task.name.clone(),
                    list_id: task.list_id.clone(),
                    success: false,
                    new_tweets: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        if let Err(e) = ctx.store.touch_task(&task.id, now).await {
            tracing::error!(task_id = %task.id, error = %e, "scheduler: failed to update task last_executed");
        }
        ctx.usage.record_op(OpKind::StoreWrite);

        if outcome.success {
            report.successful_tasks += 1;
        } else {
            report.failed_tasks += 1;
        }
        report.executed_tasks += 1;
        report.tasks.push(outcome);
    }

    for list_id in &refreshed_lists {
        run_list_analysis(ctx, list_id, now, &mut report).await;
    }

    if report.executed_tasks > 0 {
        let embed = build_cycle_embed(&report, &ctx.usage.current_window());
        report.notified = ctx.notifier.send(&embed).await;
        if report.notified {
            flag_notified(ctx, &report).await;
        }
    }

    tracing::info!(
        executed = report.executed_tasks,
        successful = report.successful_tasks,
        failed = report.failed_tasks,
        analyses = report.analyses.len(),
        skipped = report.skipped_analyses.len(),
        notified = report.notified,
        "scheduler: cycle finished"
    );
    Ok(report)
}

/// Ingests the list bound to `task`.
///
/// # Errors
///
/// Returns [`WorkerError::ListNotFound`] if the task points at a missing
/// list, otherwise whatever ingestion returns.
pub async fn execute_task(
    ctx: &WorkerContext,
    task: &ScheduledTask,
    now: DateTime<Utc>,
) -> Result<IngestReport, WorkerError> {
    let list = load_list(ctx, &task.list_id).await?;
    collect_list(
        ctx.store.as_ref(),
        ctx.source.as_ref(),
        &ctx.usage,
        &list,
        Some(&task.id),
        now,
    )
    .await
}

pub(crate) async fn load_list(
    ctx: &WorkerContext,
    list_id: &str,
) -> Result<TweetSourceList, WorkerError> {
    let list = ctx.store.get_list(list_id).await?;
    ctx.usage.record_op(OpKind::StoreRead);
    list.ok_or_else(|| WorkerError::ListNotFound(list_id.to_string()))
}

async fn run_list_analysis(
    ctx: &WorkerContext,
    list_id: &str,
    now: DateTime<Utc>,
    report: &mut CycleReport,
) {
    // Reload so the gate sees the counters this cycle just wrote.
    let list = match load_list(ctx, list_id).await {
        Ok(list) => list,
        Err(e) => {
            report.analyses.push(failed_analysis(list_id, list_id, &e.to_string()));
            return;
        }
    };

    let (template_id, options) = match ctx.engine.should_run(&list, now).await {
        Ok(GateDecision::Run {
            template_id,
            options,
        }) => (template_id, options),
        Ok(GateDecision::Skip(reason)) => {
            tracing::info!(list_id, %reason, "scheduler: analysis skipped");
            report.skipped_analyses.push(SkippedAnalysis {
                list_id: list_id.to_string(),
                reason,
            });
            return;
        }
        Err(e) => {
            tracing::error!(list_id, error = %e, "scheduler: analysis gate failed");
            report
                .analyses
                .push(failed_analysis(list_id, &list.name, &e.to_string()));
            return;
        }
    };

    let attempt = ctx.engine.run(&list, &template_id, options).await;
    let outcome = match attempt.result {
        Ok(summary) => AnalysisOutcome {
            list_id: list.id.clone(),
            list_name: list.name.clone(),
            success: true,
            analysis_id: Some(summary.analysis_id),
            tweet_count: summary.tweet_count,
            tokens_used: summary.tokens_used,
            summary: Some(summary.summary),
            error: None,
        },
        Err(e) => AnalysisOutcome {
            analysis_id: attempt.analysis_id.clone(),
            ..failed_analysis(&list.id, &list.name, &e.to_string())
        },
    };
    report.analyses.push(outcome);

    // No record means no attempt.
    if attempt.analysis_id.is_none() {
        return;
    }
    if let Err(e) = ctx.store.set_list_last_analyzed(&list.id, Utc::now()).await {
        tracing::error!(list_id, error = %e, "scheduler: failed to update last_analyzed");
    }
    ctx.usage.record_op(OpKind::StoreWrite);
}

fn failed_analysis(list_id: &str, list_name: &str, error: &str) -> AnalysisOutcome {
    AnalysisOutcome {
        list_id: list_id.to_string(),
        list_name: list_name.to_string(),
        success: false,
        analysis_id: None,
        tweet_count: 0,
        tokens_used: 0,
        summary: None,
        error: Some(error.to_string()),
    }
}

async fn flag_notified(ctx: &WorkerContext, report: &CycleReport) {
    let ids: Vec<String> = report
        .analyses
        .iter()
        .filter_map(|a| a.analysis_id.clone())
        .collect();
    if ids.is_empty() {
        return;
    }
    if let Err(e) = ctx.store.mark_analyses_notified(&ids, Utc::now()).await {
        tracing::warn!(error = %e, "scheduler: failed to flag analyses as notified");
    }
    ctx.usage.record_op(OpKind::StoreWrite);
}
