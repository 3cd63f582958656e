//! CSV export of an analysed tweet batch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use listwatch_core::{CollectedTweet, TemplateCategory};

use crate::error::AnalysisError;
use crate::parse::ParsedAnalysis;

/// UTF-8 byte-order mark so spreadsheet tools detect the encoding.
const BOM: &str = "\u{feff}";

const BASE_COLUMNS: [&str; 7] = [
    "tweet_id",
    "author",
    "text",
    "created_at",
    "category",
    "list_name",
    "exported_at",
];

const SENTIMENT_COLUMNS: [&str; 4] = [
    "overall_sentiment",
    "positive_pct",
    "negative_pct",
    "neutral_pct",
];

/// Everything about the batch that is the same on every row.
#[derive(Debug, Clone, Copy)]
pub struct ExportContext<'a> {
    pub list_name: &'a str,
    pub category: TemplateCategory,
    pub parsed: &'a ParsedAnalysis,
    pub exported_at: DateTime<Utc>,
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn pct(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| quote(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders the export. Every field is quoted; the last row carries the
/// batch summary in the `text` column.
#[must_use]
pub fn render_csv(tweets: &[CollectedTweet], ctx: &ExportContext<'_>) -> String {
    let sentiment = ctx.parsed.distribution().map(|d| {
        vec![
            ctx.parsed.overall_sentiment().unwrap_or_default().to_string(),
            pct(d.positive),
            pct(d.negative),
            pct(d.neutral),
        ]
    });

    let mut header: Vec<String> = BASE_COLUMNS.iter().map(ToString::to_string).collect();
    if sentiment.is_some() {
        header.extend(SENTIMENT_COLUMNS.iter().map(ToString::to_string));
    }

    let exported_at = ctx.exported_at.to_rfc3339();
    let mut lines = vec![row(&header)];

    for tweet in tweets {
        let mut fields = vec![
            tweet.tweet_id.clone(),
            tweet.author_name.clone(),
            tweet.text.clone(),
            tweet.created_at.to_rfc3339(),
            ctx.category.to_string(),
            ctx.list_name.to_string(),
            exported_at.clone(),
        ];
        if let Some(extra) = &sentiment {
            fields.extend(extra.iter().cloned());
        }
        lines.push(row(&fields));
    }

    let mut summary = vec![
        "SUMMARY".to_string(),
        String::new(),
        ctx.parsed.summary().to_string(),
        String::new(),
        ctx.category.to_string(),
        ctx.list_name.to_string(),
        exported_at,
    ];
    if let Some(extra) = sentiment {
        summary.extend(extra);
    }
    lines.push(row(&summary));

    let mut out = String::from(BOM);
    out.push_str(&lines.join("\n"));
    out.push('\n');
    out
}

/// `{export_dir}/{YYYY}/{MM}/analysis_{list_id}_{analysis_id}.csv`.
#[must_use]
pub fn export_path(
    export_dir: &Path,
    list_id: &str,
    analysis_id: &str,
    at: DateTime<Utc>,
) -> PathBuf {
    let safe_list_id: String = list_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    export_dir
        .join(at.format("%Y").to_string())
        .join(at.format("%m").to_string())
        .join(format!("analysis_{safe_list_id}_{analysis_id}.csv"))
}

/// Renders and writes the export, creating the month directory as needed.
///
/// # Errors
///
/// Returns [`AnalysisError::Export`] if the directory or file cannot be
/// written.
pub async fn write_export(
    export_dir: &Path,
    list_id: &str,
    analysis_id: &str,
    tweets: &[CollectedTweet],
    ctx: &ExportContext<'_>,
) -> Result<PathBuf, AnalysisError> {
    let path = export_path(export_dir, list_id, analysis_id, ctx.exported_at);
    let io_err = |source| AnalysisError::Export {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(&path, render_csv(tweets, ctx))
        .await
        .map_err(io_err)?;

    tracing::debug!(path = %path.display(), rows = tweets.len(), "analysis: export written");
    Ok(path)
}
