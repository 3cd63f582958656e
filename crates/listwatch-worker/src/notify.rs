//! Discord webhook notifications for cycle results.
//!
//! Delivery is best-effort: failures are logged and reported as `false`,
//! never returned as errors.

use std::time::Duration;

use chrono::Utc;
use listwatch_core::{OpKind, UsageWindow};
use reqwest::Client;
use serde::Serialize;

use crate::cycle::CycleReport;
use crate::WorkerError;

pub const COLOR_SUCCESS: u32 = 0x002e_cc71;
pub const COLOR_PARTIAL: u32 = 0x00f3_9c12;
pub const COLOR_FAILURE: u32 = 0x00e7_4c3c;

/// Discord caps embeds at 25 fields.
const MAX_FIELDS: usize = 25;
/// Discord caps field values at 1024 characters.
const MAX_FIELD_VALUE_CHARS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a Embed; 1],
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= MAX_FIELD_VALUE_CHARS {
        return value.to_string();
    }
    let mut out: String = value.chars().take(MAX_FIELD_VALUE_CHARS - 3).collect();
    out.push_str("...");
    out
}

fn field(name: impl Into<String>, value: &str, inline: bool) -> EmbedField {
    EmbedField {
        name: name.into(),
        value: truncate(value),
        inline,
    }
}

/// Green when nothing failed, red when every task failed, orange otherwise.
#[must_use]
pub fn cycle_color(report: &CycleReport) -> u32 {
    let failed_analyses = report.analyses.iter().filter(|a| !a.success).count();
    if report.failed_tasks == 0 && failed_analyses == 0 {
        COLOR_SUCCESS
    } else if report.successful_tasks == 0 {
        COLOR_FAILURE
    } else {
        COLOR_PARTIAL
    }
}

/// Builds the embed summarising one cycle.
#[must_use]
pub fn build_cycle_embed(report: &CycleReport, usage: &UsageWindow) -> Embed {
    let mut fields = vec![field(
        "Tasks",
        &format!(
            "{} executed / {} succeeded / {} failed",
            report.executed_tasks, report.successful_tasks, report.failed_tasks
        ),
        false,
    )];

    for task in &report.tasks {
        let value = match &task.error {
            None => format!("{} new tweets", task.new_tweets),
            Some(error) => format!("error: {error}"),
        };
        let mark = if task.success { "✅" } else { "❌" };
        fields.push(field(format!("{mark} {}", task.task_name), &value, true));
    }

    for analysis in &report.analyses {
        let value = if analysis.success {
            format!(
                "{} tweets, {} tokens\n{}",
                analysis.tweet_count,
                analysis.tokens_used,
                analysis.summary.as_deref().unwrap_or_default()
            )
        } else {
            format!(
                "error: {}",
                analysis.error.as_deref().unwrap_or("unknown error")
            )
        };
        let mark = if analysis.success { "📊" } else { "⚠️" };
        fields.push(field(
            format!("{mark} Analysis: {}", analysis.list_name),
            &value,
            false,
        ));
    }

    fields.push(field(
        "Usage today",
        &format!(
            "store reads {} / writes {} / source requests {} / LLM requests {}",
            usage.count(OpKind::StoreRead),
            usage.count(OpKind::StoreWrite),
            usage.count(OpKind::SourceRequest),
            usage.count(OpKind::LlmRequest)
        ),
        false,
    ));

    if fields.len() > MAX_FIELDS {
        let dropped = fields.len() - (MAX_FIELDS - 1);
        fields.truncate(MAX_FIELDS - 1);
        fields.push(field("…", &format!("{dropped} more entries omitted"), false));
    }

    Embed {
        title: "listwatch cycle report".to_string(),
        color: cycle_color(report),
        fields,
        timestamp: Utc::now().to_rfc3339(),
    }
}

/// Posts embeds to a Discord webhook. Without a URL every send is a no-op.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    /// # Errors
    ///
    /// Returns [`WorkerError::Http`] if the HTTP client cannot be built.
    pub fn new(webhook_url: Option<String>, timeout_secs: u64) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Sends `embed`. Returns whether the webhook accepted it.
    pub async fn send(&self, embed: &Embed) -> bool {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("notify: no webhook configured; skipping");
            return false;
        };

        let result = self
            .client
            .post(url)
            .json(&WebhookPayload { embeds: [embed] })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!("notify: cycle report delivered");
                true
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "notify: webhook rejected message");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "notify: webhook request failed");
                false
            }
        }
    }
}
