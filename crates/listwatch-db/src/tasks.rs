//! Database operations for `cron_tasks`.

use chrono::{DateTime, Utc};
use listwatch_core::ScheduledTask;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `cron_tasks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub frequency_minutes: i32,
    pub last_executed: Option<DateTime<Utc>>,
    pub list_id: String,
}

impl From<TaskRow> for ScheduledTask {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            active: row.active,
            frequency_minutes: row.frequency_minutes,
            last_executed: row.last_executed,
            list_id: row.list_id,
        }
    }
}

/// Returns every task with `active = true`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_tasks(pool: &PgPool) -> Result<Vec<ScheduledTask>, DbError> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT id, name, active, frequency_minutes, last_executed, list_id \
         FROM cron_tasks \
         WHERE active = true \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ScheduledTask::from).collect())
}

/// Inserts a task or updates its name, flag, frequency, and list binding.
/// `last_executed` of an existing task is kept.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_task(pool: &PgPool, task: &ScheduledTask) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO cron_tasks (id, name, active, frequency_minutes, last_executed, list_id) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, \
             active = EXCLUDED.active, \
             frequency_minutes = EXCLUDED.frequency_minutes, \
             list_id = EXCLUDED.list_id, \
             updated_at = NOW()",
    )
    .bind(&task.id)
    .bind(&task.name)
    .bind(task.active)
    .bind(task.frequency_minutes)
    .bind(task.last_executed)
    .bind(&task.list_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Records that a task ran at `at`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no task has the given id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn touch_task(pool: &PgPool, task_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE cron_tasks SET last_executed = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(at)
    .bind(task_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
