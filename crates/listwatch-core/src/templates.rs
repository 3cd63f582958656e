//! Analysis templates (`analysis_templates`) and their validation rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the numbered tweet listing. Required in every prompt.
pub const TEMPLATE_TWEETS_PLACEHOLDER: &str = "{{tweets}}";
/// Optional placeholder replaced by the number of tweets in the batch.
pub const TEMPLATE_TWEET_COUNT_PLACEHOLDER: &str = "{{tweet_count}}";

pub const MIN_MAX_TOKENS: i32 = 100;
pub const MAX_MAX_TOKENS: i32 = 4000;
pub const DEFAULT_MAX_TOKENS: i32 = 2000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Sentiment,
    Trend,
    Summary,
    Custom,
}

impl TemplateCategory {
    pub const ALL: [TemplateCategory; 4] = [
        TemplateCategory::Sentiment,
        TemplateCategory::Trend,
        TemplateCategory::Summary,
        TemplateCategory::Custom,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateCategory::Sentiment => "sentiment",
            TemplateCategory::Trend => "trend",
            TemplateCategory::Summary => "summary",
            TemplateCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown template category '{s}'"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateUsage {
    pub total_runs: i64,
    pub last_used: Option<DateTime<Utc>>,
}

/// A stored, validated analysis template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTemplate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: TemplateCategory,
    pub prompt: String,
    pub max_tokens: i32,
    pub temperature: f64,
    pub active: bool,
    pub usage: TemplateUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unvalidated template input, as submitted by an operator or a seed file.
///
/// `category` stays a string so that an unknown value is reported by
/// [`validate_template`] rather than rejected by deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl From<&AnalysisTemplate> for TemplateDraft {
    fn from(t: &AnalysisTemplate) -> Self {
        Self {
            name: t.name.clone(),
            description: t.description.clone(),
            category: t.category.to_string(),
            prompt: t.prompt.clone(),
            max_tokens: Some(t.max_tokens),
            temperature: Some(t.temperature),
            active: Some(t.active),
        }
    }
}

/// Partial update for a template. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub prompt: Option<String>,
    pub max_tokens: Option<i32>,
    pub temperature: Option<f64>,
    pub active: Option<bool>,
}

impl TemplatePatch {
    /// Applies this patch on top of `draft`.
    #[must_use]
    pub fn apply_to(&self, mut draft: TemplateDraft) -> TemplateDraft {
        if let Some(name) = &self.name {
            draft.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            draft.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            draft.category.clone_from(category);
        }
        if let Some(prompt) = &self.prompt {
            draft.prompt.clone_from(prompt);
        }
        if self.max_tokens.is_some() {
            draft.max_tokens = self.max_tokens;
        }
        if self.temperature.is_some() {
            draft.temperature = self.temperature;
        }
        if self.active.is_some() {
            draft.active = self.active;
        }
        draft
    }
}

/// Equality filters for listing templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    pub category: Option<TemplateCategory>,
    pub active: Option<bool>,
}

impl TemplateFilter {
    #[must_use]
    pub fn matches(&self, template: &AnalysisTemplate) -> bool {
        self.category.is_none_or(|c| c == template.category)
            && self.active.is_none_or(|a| a == template.active)
    }
}

/// Validates a template draft, returning one human-readable message per
/// violated rule. An empty vector means the draft is valid.
#[must_use]
pub fn validate_template(draft: &TemplateDraft) -> Vec<String> {
    let mut errors = Vec::new();

    if draft.name.trim().is_empty() {
        errors.push("name must not be empty".to_string());
    }

    if draft.category.parse::<TemplateCategory>().is_err() {
        let allowed: Vec<&str> = TemplateCategory::ALL.iter().map(|c| c.as_str()).collect();
        errors.push(format!(
            "category '{}' is invalid; must be one of: {}",
            draft.category,
            allowed.join(", ")
        ));
    }

    if draft.prompt.trim().is_empty() {
        errors.push("prompt must not be empty".to_string());
    } else if !draft.prompt.contains(TEMPLATE_TWEETS_PLACEHOLDER) {
        errors.push(format!(
            "prompt must contain the {TEMPLATE_TWEETS_PLACEHOLDER} placeholder"
        ));
    }

    if let Some(max_tokens) = draft.max_tokens {
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
            errors.push(format!(
                "max_tokens {max_tokens} is out of range; must be between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}"
            ));
        }
    }

    if let Some(temperature) = draft.temperature {
        if !(0.0..=1.0).contains(&temperature) {
            errors.push(format!(
                "temperature {temperature} is out of range; must be between 0 and 1"
            ));
        }
    }

    errors
}
