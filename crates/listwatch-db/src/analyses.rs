//! Database operations for `ai_analysis`.
//!
//! Status transitions are guarded in SQL: `complete_analysis` and
//! `fail_analysis` only touch rows still in `processing`.

use chrono::{DateTime, Utc};
use listwatch_core::{AnalysisInput, AnalysisOutput, AnalysisRecord, AnalysisStatus};
use sqlx::{types::Json, PgPool};

use crate::{AnalysisCompletion, AnalysisFailure, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `ai_analysis` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRow {
    pub id: String,
    pub status: String,
    pub list_id: String,
    pub template_id: String,
    pub input: Option<Json<AnalysisInput>>,
    pub output: Option<Json<AnalysisOutput>>,
    pub summary: Option<String>,
    pub csv_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_secs: Option<f64>,
    pub discord_notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

impl TryFrom<AnalysisRow> for AnalysisRecord {
    type Error = DbError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        let status =
            AnalysisStatus::from_label(&row.status).ok_or_else(|| DbError::CorruptRow {
                table: "ai_analysis",
                id: row.id.clone(),
                reason: format!("unknown status '{}'", row.status),
            })?;

        Ok(Self {
            id: row.id,
            status,
            list_id: row.list_id,
            template_id: row.template_id,
            input: row.input.map(|Json(input)| input),
            output: row.output.map(|Json(output)| output),
            summary: row.summary,
            csv_path: row.csv_path,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
            processing_time_secs: row.processing_time_secs,
            discord_notified: row.discord_notified,
            notified_at: row.notified_at,
        })
    }
}

const ANALYSIS_COLUMNS: &str = "id, status, list_id, template_id, input, output, summary, \
     csv_path, error_message, created_at, completed_at, processing_time_secs, \
     discord_notified, notified_at";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Inserts a new analysis record as given (normally in `processing`).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_analysis(pool: &PgPool, record: &AnalysisRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO ai_analysis \
             (id, status, list_id, template_id, input, output, summary, csv_path, \
              error_message, created_at, completed_at, processing_time_secs, \
              discord_notified, notified_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(&record.id)
    .bind(record.status.as_str())
    .bind(&record.list_id)
    .bind(&record.template_id)
    .bind(record.input.as_ref().map(Json))
    .bind(record.output.as_ref().map(Json))
    .bind(&record.summary)
    .bind(&record.csv_path)
    .bind(&record.error_message)
    .bind(record.created_at)
    .bind(record.completed_at)
    .bind(record.processing_time_secs)
    .bind(record.discord_notified)
    .bind(record.notified_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Moves a `processing` analysis to `completed` with its full output.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the record is missing or no
/// longer `processing`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_analysis(
    pool: &PgPool,
    id: &str,
    completion: &AnalysisCompletion,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ai_analysis \
         SET status = 'completed', input = $1, output = $2, summary = $3, csv_path = $4, \
             completed_at = $5, processing_time_secs = $6 \
         WHERE id = $7 AND status = 'processing'",
    )
    .bind(Json(&completion.input))
    .bind(Json(&completion.output))
    .bind(&completion.summary)
    .bind(&completion.csv_path)
    .bind(completion.completed_at)
    .bind(completion.processing_time_secs)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            table: "ai_analysis",
            id: id.to_string(),
            expected_status: "processing",
        });
    }

    Ok(())
}

/// Moves a `processing` analysis to `error`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the record is missing or no
/// longer `processing`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_analysis(
    pool: &PgPool,
    id: &str,
    failure: &AnalysisFailure,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ai_analysis \
         SET status = 'error', error_message = $1, completed_at = $2, \
             processing_time_secs = $3 \
         WHERE id = $4 AND status = 'processing'",
    )
    .bind(&failure.error_message)
    .bind(failure.completed_at)
    .bind(failure.processing_time_secs)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            table: "ai_analysis",
            id: id.to_string(),
            expected_status: "processing",
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Fetches an analysis by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::CorruptRow`]
/// if the stored status is unknown.
pub async fn get_analysis(pool: &PgPool, id: &str) -> Result<Option<AnalysisRecord>, DbError> {
    let row = sqlx::query_as::<_, AnalysisRow>(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM ai_analysis WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(AnalysisRecord::try_from).transpose()
}

/// Returns the most recent `limit` analyses, optionally for one list.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_analyses(
    pool: &PgPool,
    list_id: Option<&str>,
    limit: i64,
) -> Result<Vec<AnalysisRecord>, DbError> {
    let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM ai_analysis \
         WHERE ($1::TEXT IS NULL OR list_id = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(list_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AnalysisRecord::try_from).collect()
}

/// Flags analyses as reported by a delivered notification.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_analyses_notified(
    pool: &PgPool,
    ids: &[String],
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    if ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "UPDATE ai_analysis SET discord_notified = true, notified_at = $1 WHERE id = ANY($2)",
    )
    .bind(at)
    .bind(ids)
    .execute(pool)
    .await?;

    Ok(())
}
