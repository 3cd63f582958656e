//! Database operations for `analysis_templates`.

use chrono::{DateTime, Utc};
use listwatch_core::{AnalysisTemplate, TemplateCategory, TemplateFilter, TemplateUsage};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `analysis_templates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub prompt: String,
    pub max_tokens: i32,
    pub temperature: f64,
    pub active: bool,
    pub total_runs: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for AnalysisTemplate {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let category =
            row.category
                .parse::<TemplateCategory>()
                .map_err(|reason| DbError::CorruptRow {
                    table: "analysis_templates",
                    id: row.id.clone(),
                    reason,
                })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            category,
            prompt: row.prompt,
            max_tokens: row.max_tokens,
            temperature: row.temperature,
            active: row.active,
            usage: TemplateUsage {
                total_runs: row.total_runs,
                last_used: row.last_used,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const TEMPLATE_COLUMNS: &str = "id, name, description, category, prompt, max_tokens, \
     temperature, active, total_runs, last_used, created_at, updated_at";

fn into_templates(rows: Vec<TemplateRow>) -> Result<Vec<AnalysisTemplate>, DbError> {
    rows.into_iter().map(AnalysisTemplate::try_from).collect()
}

/// Inserts a new template.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including on a duplicate id.
pub async fn insert_template(pool: &PgPool, template: &AnalysisTemplate) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO analysis_templates \
             (id, name, description, category, prompt, max_tokens, temperature, active, \
              total_runs, last_used, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&template.id)
    .bind(&template.name)
    .bind(&template.description)
    .bind(template.category.as_str())
    .bind(&template.prompt)
    .bind(template.max_tokens)
    .bind(template.temperature)
    .bind(template.active)
    .bind(template.usage.total_runs)
    .bind(template.usage.last_used)
    .bind(template.created_at)
    .bind(template.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches a template by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::CorruptRow`]
/// if the stored category is unknown.
pub async fn get_template(pool: &PgPool, id: &str) -> Result<Option<AnalysisTemplate>, DbError> {
    let row = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM analysis_templates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(AnalysisTemplate::try_from).transpose()
}

/// Fetches the oldest template with exactly this name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_template_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<AnalysisTemplate>, DbError> {
    let row = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM analysis_templates \
         WHERE name = $1 \
         ORDER BY created_at \
         LIMIT 1"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(AnalysisTemplate::try_from).transpose()
}

/// Lists templates matching the filter, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_templates(
    pool: &PgPool,
    filter: TemplateFilter,
) -> Result<Vec<AnalysisTemplate>, DbError> {
    let rows = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM analysis_templates \
         WHERE ($1::TEXT IS NULL OR category = $1) \
           AND ($2::BOOLEAN IS NULL OR active = $2) \
         ORDER BY name, id"
    ))
    .bind(filter.category.map(TemplateCategory::as_str))
    .bind(filter.active)
    .fetch_all(pool)
    .await?;

    into_templates(rows)
}

/// Overwrites the editable fields of a template.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_template(pool: &PgPool, template: &AnalysisTemplate) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE analysis_templates \
         SET name = $1, description = $2, category = $3, prompt = $4, max_tokens = $5, \
             temperature = $6, active = $7, updated_at = $8 \
         WHERE id = $9",
    )
    .bind(&template.name)
    .bind(&template.description)
    .bind(template.category.as_str())
    .bind(&template.prompt)
    .bind(template.max_tokens)
    .bind(template.temperature)
    .bind(template.active)
    .bind(template.updated_at)
    .bind(&template.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Deletes a template if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_template(pool: &PgPool, id: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM analysis_templates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Counts all stored templates.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_templates(pool: &PgPool) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_templates")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Increments `total_runs` and sets `last_used`. The increment happens in
/// the database, so concurrent callers never lose a run.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_template_usage(
    pool: &PgPool,
    id: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE analysis_templates SET total_runs = total_runs + 1, last_used = $1 WHERE id = $2",
    )
    .bind(at)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
