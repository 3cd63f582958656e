//! Job dispatcher. Every job, scheduled or manual, goes through
//! [`process_job`], which writes one `worker_executions` row per job whatever
//! the outcome.

use std::time::Instant;

use chrono::Utc;
use listwatch_analysis::{templates, AnalysisOptions, AnalysisSummary};
use listwatch_core::{ExecutionStatus, OpKind, WorkerExecution};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::WorkerContext;
use crate::cycle::{load_list, run_cycle};
use crate::ingest::collect_list;
use crate::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ScheduledCycle,
    CollectList,
    ManualAnalysis,
    Test,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduledCycle => "scheduled_cycle",
            Self::CollectList => "collect_list",
            Self::ManualAnalysis => "manual_analysis",
            Self::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl JobRequest {
    #[must_use]
    pub fn new(job_type: JobType, data: Value) -> Self {
        Self {
            job_type,
            data,
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub result: Value,
    /// Milliseconds.
    pub processing_time: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectListData {
    list_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManualAnalysisData {
    list_id: String,
    #[serde(default)]
    template_id: Option<String>,
}

fn job_data<T: serde::de::DeserializeOwned>(job: &JobRequest) -> Result<T, WorkerError> {
    serde_json::from_value(job.data.clone())
        .map_err(|e| WorkerError::InvalidJobData(format!("{}: {e}", job.job_type.as_str())))
}

/// Runs `job` and records its execution.
///
/// The caller is responsible for serialising jobs; see [`submit_job`].
///
/// # Errors
///
/// Returns the job's own error after the execution row has been written.
pub async fn process_job(ctx: &WorkerContext, job: JobRequest) -> Result<JobResult, WorkerError> {
    let request_id = job
        .request_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let started = Instant::now();

    tracing::info!(job_type = job.job_type.as_str(), request_id = %request_id, "dispatcher: job started");
    let outcome = run_job(ctx, &job).await;
    let elapsed_ms = started.elapsed().as_millis();

    let (status, result, error_message) = match &outcome {
        Ok(value) => (ExecutionStatus::Success, Some(value.clone()), None),
        Err(e) => (ExecutionStatus::Error, None, Some(e.to_string())),
    };

    let execution = WorkerExecution {
        id: Uuid::new_v4().to_string(),
        job_type: job.job_type.as_str().to_string(),
        request_id: request_id.clone(),
        status,
        result,
        error_message,
        duration_ms: i64::try_from(elapsed_ms).unwrap_or(i64::MAX),
        memory_rss_kb: read_rss_kb().await,
        uptime_secs: ctx.uptime_secs(),
        created_at: Utc::now(),
    };
    if let Err(e) = ctx.store.record_execution(&execution).await {
        tracing::error!(request_id = %request_id, error = %e, "dispatcher: failed to record execution");
    }
    ctx.usage.record_op(OpKind::StoreWrite);

    match outcome {
        Ok(result) => {
            tracing::info!(
                job_type = job.job_type.as_str(),
                request_id = %request_id,
                duration_ms = execution.duration_ms,
                "dispatcher: job finished"
            );
            Ok(JobResult {
                success: true,
                result,
                processing_time: u64::try_from(elapsed_ms).unwrap_or(u64::MAX),
            })
        }
        Err(e) => {
            tracing::error!(
                job_type = job.job_type.as_str(),
                request_id = %request_id,
                error = %e,
                "dispatcher: job failed"
            );
            Err(e)
        }
    }
}

/// Waits for any running job, then runs `job`.
///
/// # Errors
///
/// See [`process_job`].
pub async fn submit_job(ctx: &WorkerContext, job: JobRequest) -> Result<JobResult, WorkerError> {
    let _guard = ctx.lock_jobs().await;
    process_job(ctx, job).await
}

/// Runs a scheduled cycle unless another job holds the lock, in which case
/// the tick is dropped and `None` returned.
pub async fn run_scheduled_tick(ctx: &WorkerContext) -> Option<Result<JobResult, WorkerError>> {
    let Some(_guard) = ctx.try_lock_jobs() else {
        tracing::warn!("scheduler: previous job still running; skipping tick");
        return None;
    };
    Some(process_job(ctx, JobRequest::new(JobType::ScheduledCycle, Value::Null)).await)
}

async fn run_job(ctx: &WorkerContext, job: &JobRequest) -> Result<Value, WorkerError> {
    match job.job_type {
        JobType::ScheduledCycle => {
            let report = run_cycle(ctx, Utc::now()).await?;
            Ok(serde_json::to_value(report)?)
        }
        JobType::CollectList => {
            let data: CollectListData = job_data(job)?;
            let list = load_list(ctx, &data.list_id).await?;
            let report = collect_list(
                ctx.store.as_ref(),
                ctx.source.as_ref(),
                &ctx.usage,
                &list,
                None,
                Utc::now(),
            )
            .await?;
            Ok(serde_json::to_value(report)?)
        }
        JobType::ManualAnalysis => {
            let data: ManualAnalysisData = job_data(job)?;
            let summary =
                run_manual_analysis(ctx, &data.list_id, data.template_id.as_deref()).await?;
            Ok(serde_json::to_value(summary)?)
        }
        JobType::Test => Ok(json!({
            "message": "test job completed",
            "data": job.data,
            "usage": ctx.usage.current_window(),
        })),
    }
}

/// Analyzes `list_id` on demand, skipping the gate's enablement and
/// cooldown checks. `template_id` defaults to the list's configured one.
///
/// # Errors
///
/// - [`WorkerError::ListNotFound`] if the list does not exist.
/// - [`WorkerError::TemplateNotConfigured`] if no template was given and the
///   list has none.
/// - [`WorkerError::Template`] if the template does not exist.
/// - [`WorkerError::Analysis`] if the engine fails.
pub async fn run_manual_analysis(
    ctx: &WorkerContext,
    list_id: &str,
    template_id: Option<&str>,
) -> Result<AnalysisSummary, WorkerError> {
    let list = load_list(ctx, list_id).await?;

    let template_id = match template_id {
        Some(id) => id.to_string(),
        None => list
            .analysis
            .template_id
            .clone()
            .ok_or_else(|| WorkerError::TemplateNotConfigured(list.id.clone()))?,
    };
    templates::get_template(ctx.store.as_ref(), &template_id).await?;
    ctx.usage.record_op(OpKind::StoreRead);

    let attempt = ctx
        .engine
        .run(&list, &template_id, AnalysisOptions::for_list(&list))
        .await;

    if attempt.analysis_id.is_some() {
        if let Err(e) = ctx.store.set_list_last_analyzed(&list.id, Utc::now()).await {
            tracing::error!(list_id, error = %e, "dispatcher: failed to update last_analyzed");
        }
        ctx.usage.record_op(OpKind::StoreWrite);
    }

    attempt.result.map_err(WorkerError::from)
}

/// Resident set size of this process in KiB, where `/proc` is available.
async fn read_rss_kb() -> Option<i64> {
    let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<i64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}
