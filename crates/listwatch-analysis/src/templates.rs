//! Template registry: CRUD over `analysis_templates` with validation.

use chrono::Utc;
use listwatch_core::templates::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use listwatch_core::{
    validate_template, AnalysisTemplate, TemplateCategory, TemplateDraft, TemplateFilter,
    TemplatePatch, TemplateUsage,
};
use listwatch_db::{DbError, Store};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TemplateError;

const DEFAULT_TEMPLATES_YAML: &str = include_str!("default_templates.yaml");

/// Acknowledgement returned by [`delete_template`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAck {
    pub id: String,
    pub deleted: bool,
}

/// Builds a template from a draft that already passed validation.
fn from_valid_draft(
    id: String,
    draft: TemplateDraft,
    usage: TemplateUsage,
    created_at: chrono::DateTime<Utc>,
) -> Result<AnalysisTemplate, TemplateError> {
    let category = draft
        .category
        .parse::<TemplateCategory>()
        .map_err(|e| TemplateError::Invalid(vec![e]))?;

    Ok(AnalysisTemplate {
        id,
        name: draft.name.trim().to_string(),
        description: draft.description,
        category,
        prompt: draft.prompt,
        max_tokens: draft.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: draft.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        active: draft.active.unwrap_or(true),
        usage,
        created_at,
        updated_at: Utc::now(),
    })
}

/// Validates and stores a new template.
///
/// # Errors
///
/// - [`TemplateError::Invalid`] with every violated rule.
/// - [`TemplateError::DuplicateName`] if a template already has this name.
/// - [`TemplateError::Db`] if the store fails.
pub async fn create_template(
    store: &dyn Store,
    draft: TemplateDraft,
) -> Result<AnalysisTemplate, TemplateError> {
    let errors = validate_template(&draft);
    if !errors.is_empty() {
        return Err(TemplateError::Invalid(errors));
    }

    let name = draft.name.trim();
    if store.find_template_by_name(name).await?.is_some() {
        return Err(TemplateError::DuplicateName(name.to_string()));
    }

    let now = Utc::now();
    let mut template = from_valid_draft(
        Uuid::new_v4().to_string(),
        draft,
        TemplateUsage::default(),
        now,
    )?;
    template.updated_at = now;

    store.insert_template(&template).await?;
    tracing::info!(template_id = %template.id, name = %template.name, "templates: created");
    Ok(template)
}

/// # Errors
///
/// Returns [`TemplateError::NotFound`] if no template has this id.
pub async fn get_template(store: &dyn Store, id: &str) -> Result<AnalysisTemplate, TemplateError> {
    store
        .get_template(id)
        .await?
        .ok_or_else(|| TemplateError::NotFound(id.to_string()))
}

/// # Errors
///
/// Returns [`TemplateError::Db`] if the store fails.
pub async fn list_templates(
    store: &dyn Store,
    filter: TemplateFilter,
) -> Result<Vec<AnalysisTemplate>, TemplateError> {
    Ok(store.list_templates(filter).await?)
}

/// Merges `patch` over the stored template, re-validates, and refreshes
/// `updated_at`.
///
/// # Errors
///
/// - [`TemplateError::NotFound`] if no template has this id.
/// - [`TemplateError::Invalid`] if the merged template breaks a rule.
/// - [`TemplateError::DuplicateName`] if a rename collides.
pub async fn update_template(
    store: &dyn Store,
    id: &str,
    patch: &TemplatePatch,
) -> Result<AnalysisTemplate, TemplateError> {
    let existing = get_template(store, id).await?;
    let merged = patch.apply_to(TemplateDraft::from(&existing));

    let errors = validate_template(&merged);
    if !errors.is_empty() {
        return Err(TemplateError::Invalid(errors));
    }

    let name = merged.name.trim();
    if name != existing.name {
        if let Some(other) = store.find_template_by_name(name).await? {
            if other.id != existing.id {
                return Err(TemplateError::DuplicateName(name.to_string()));
            }
        }
    }

    let updated = from_valid_draft(
        existing.id.clone(),
        merged,
        existing.usage.clone(),
        existing.created_at,
    )?;
    store.update_template(&updated).await.map_err(|e| match e {
        DbError::NotFound => TemplateError::NotFound(id.to_string()),
        other => TemplateError::Db(other),
    })?;
    Ok(updated)
}

/// Deletes a template. Deleting an unknown id still succeeds.
///
/// # Errors
///
/// Returns [`TemplateError::Db`] if the store fails.
pub async fn delete_template(store: &dyn Store, id: &str) -> Result<DeleteAck, TemplateError> {
    store.delete_template(id).await?;
    Ok(DeleteAck {
        id: id.to_string(),
        deleted: true,
    })
}

/// Adds one run to the template's usage counters.
///
/// # Errors
///
/// Returns [`TemplateError::NotFound`] if no template has this id.
pub async fn increment_usage(store: &dyn Store, id: &str) -> Result<(), TemplateError> {
    store
        .record_template_usage(id, Utc::now())
        .await
        .map_err(|e| match e {
            DbError::NotFound => TemplateError::NotFound(id.to_string()),
            other => TemplateError::Db(other),
        })
}

/// The built-in template drafts.
///
/// # Errors
///
/// Returns [`TemplateError::Defaults`] if the embedded YAML is malformed.
pub fn default_template_drafts() -> Result<Vec<TemplateDraft>, TemplateError> {
    Ok(serde_yaml::from_str(DEFAULT_TEMPLATES_YAML)?)
}

/// Installs the built-in templates when the registry is empty. Returns how
/// many were created (zero when any template already exists).
///
/// # Errors
///
/// Returns [`TemplateError`] if the defaults fail to parse or validate, or
/// the store fails.
pub async fn seed_default_templates(store: &dyn Store) -> Result<usize, TemplateError> {
    if store.count_templates().await? > 0 {
        tracing::debug!("templates: registry not empty, skipping defaults");
        return Ok(0);
    }

    let drafts = default_template_drafts()?;
    let count = drafts.len();
    for draft in drafts {
        create_template(store, draft).await?;
    }
    tracing::info!(count, "templates: installed defaults");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use listwatch_db::MemoryStore;

    use super::*;

    fn draft(name: &str) -> TemplateDraft {
        TemplateDraft {
            name: name.to_string(),
            category: "custom".to_string(),
            prompt: "Look at {{tweets}}".to_string(),
            ..TemplateDraft::default()
        }
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let store = MemoryStore::new();
        let template = create_template(&store, draft("t")).await.unwrap();

        assert_eq!(template.max_tokens, DEFAULT_MAX_TOKENS);
        assert!((template.temperature - DEFAULT_TEMPERATURE).abs() < f64::EPSILON);
        assert!(template.active);
        assert_eq!(template.usage.total_runs, 0);
        assert!(template.usage.last_used.is_none());
        assert_eq!(template.created_at, template.updated_at);
    }

    #[tokio::test]
    async fn create_rejects_invalid_drafts_with_all_errors() {
        let store = MemoryStore::new();
        let bad = TemplateDraft {
            max_tokens: Some(5000),
            temperature: Some(2.0),
            ..TemplateDraft {
                name: String::new(),
                category: "x".to_string(),
                prompt: "no placeholder".to_string(),
                ..TemplateDraft::default()
            }
        };

        match create_template(&store, bad).await {
            Err(TemplateError::Invalid(errors)) => assert_eq!(errors.len(), 5),
            other => panic!("expected Invalid, got {other:?}"),
        }
        assert_eq!(store.count_templates().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let store = MemoryStore::new();
        create_template(&store, draft("dup")).await.unwrap();
        let err = create_template(&store, draft("dup")).await.unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = get_template(&store, "nope").await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn update_merges_and_revalidates() {
        let store = MemoryStore::new();
        let created = create_template(&store, draft("t")).await.unwrap();

        let patch = TemplatePatch {
            temperature: Some(0.1),
            ..TemplatePatch::default()
        };
        let updated = update_template(&store, &created.id, &patch).await.unwrap();
        assert!((updated.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(updated.prompt, created.prompt);
        assert!(updated.updated_at >= created.updated_at);

        let bad = TemplatePatch {
            prompt: Some("lost the placeholder".to_string()),
            ..TemplatePatch::default()
        };
        let err = update_template(&store, &created.id, &bad).await.unwrap_err();
        assert!(matches!(err, TemplateError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let created = create_template(&store, draft("t")).await.unwrap();

        let first = delete_template(&store, &created.id).await.unwrap();
        let second = delete_template(&store, &created.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, created.id);
    }

    #[tokio::test]
    async fn increment_usage_counts_runs() {
        let store = MemoryStore::new();
        let created = create_template(&store, draft("t")).await.unwrap();

        increment_usage(&store, &created.id).await.unwrap();
        increment_usage(&store, &created.id).await.unwrap();

        let stored = get_template(&store, &created.id).await.unwrap();
        assert_eq!(stored.usage.total_runs, 2);
        assert!(stored.usage.last_used.is_some());
    }

    #[tokio::test]
    async fn list_filters_by_category_and_active() {
        let store = MemoryStore::new();
        create_template(&store, draft("a")).await.unwrap();
        create_template(
            &store,
            TemplateDraft {
                category: "trend".to_string(),
                active: Some(false),
                ..draft("b")
            },
        )
        .await
        .unwrap();

        let trends = list_templates(
            &store,
            TemplateFilter {
                category: Some(TemplateCategory::Trend),
                active: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(trends.len(), 1);

        let active = list_templates(
            &store,
            TemplateFilter {
                category: None,
                active: Some(true),
            },
        )
        .await
        .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "a");
    }

    #[tokio::test]
    async fn seed_defaults_only_runs_on_empty_registry() {
        let store = MemoryStore::new();
        assert_eq!(seed_default_templates(&store).await.unwrap(), 3);
        assert_eq!(seed_default_templates(&store).await.unwrap(), 0);

        let all = list_templates(&store, TemplateFilter::default())
            .await
            .unwrap();
        let mut categories: Vec<TemplateCategory> = all.iter().map(|t| t.category).collect();
        categories.sort_by_key(|c| c.as_str());
        assert_eq!(
            categories,
            vec![
                TemplateCategory::Sentiment,
                TemplateCategory::Summary,
                TemplateCategory::Trend
            ]
        );
    }

    #[test]
    fn default_drafts_are_valid() {
        for draft in default_template_drafts().unwrap() {
            assert!(validate_template(&draft).is_empty(), "{}", draft.name);
        }
    }
}
