//! Database operations for `worker_executions`.

use listwatch_core::WorkerExecution;
use sqlx::{types::Json, PgPool};

use crate::DbError;

/// Appends one job execution to the log.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_execution(pool: &PgPool, execution: &WorkerExecution) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO worker_executions \
             (id, job_type, request_id, status, result, error_message, duration_ms, \
              memory_rss_kb, uptime_secs, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&execution.id)
    .bind(&execution.job_type)
    .bind(&execution.request_id)
    .bind(execution.status.as_str())
    .bind(execution.result.as_ref().map(Json))
    .bind(&execution.error_message)
    .bind(execution.duration_ms)
    .bind(execution.memory_rss_kb)
    .bind(execution.uptime_secs)
    .bind(execution.created_at)
    .execute(pool)
    .await?;

    Ok(())
}
