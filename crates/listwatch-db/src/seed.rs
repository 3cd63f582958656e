use listwatch_core::{AnalysisConfig, ListsFile, ScheduledTask, TweetSourceList};

use crate::{DbError, Store};

/// Outcome of applying a list seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub lists: usize,
    pub tasks: usize,
    /// Template names referenced by the seed that no stored template carries.
    pub missing_templates: Vec<String>,
}

/// Upsert lists and their tasks from a validated seed file.
///
/// Template names are resolved to ids through the store. A name that does
/// not resolve leaves the list without a template (the gate then reports
/// `template_not_configured`) and is listed in the report.
///
/// Existing lists keep their counters and `last_analyzed`; existing tasks
/// keep their `last_executed`.
///
/// # Errors
///
/// Returns [`DbError`] if any store operation fails. Lists seeded before the
/// failure stay written.
pub async fn seed_lists(store: &dyn Store, file: &ListsFile) -> Result<SeedReport, DbError> {
    let mut report = SeedReport::default();

    for seed in &file.lists {
        let analysis = match &seed.analysis {
            Some(a) => {
                let template_id = match &a.template {
                    Some(name) => {
                        let found = store.find_template_by_name(name).await?;
                        if found.is_none() {
                            tracing::warn!(list_id = %seed.id, template = %name, "seed: template not found");
                            report.missing_templates.push(name.clone());
                        }
                        found.map(|t| t.id)
                    }
                    None => None,
                };
                AnalysisConfig {
                    enabled: a.enabled,
                    template_id,
                    frequency: a.frequency,
                    min_tweets: a.min_tweets,
                    max_tweets: a.max_tweets,
                    last_analyzed: None,
                }
            }
            None => AnalysisConfig::default(),
        };

        store
            .upsert_list(&TweetSourceList {
                id: seed.id.clone(),
                source_list_id: seed.source_list_id.clone(),
                name: seed.name.clone(),
                tweet_count: 0,
                last_executed: None,
                last_tweet_id: None,
                analysis,
            })
            .await?;
        report.lists += 1;

        store
            .upsert_task(&ScheduledTask {
                id: seed.task.id.clone(),
                name: seed
                    .task
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Collect {}", seed.name)),
                active: seed.task.active,
                frequency_minutes: seed.task.frequency_minutes,
                last_executed: None,
                list_id: seed.id.clone(),
            })
            .await?;
        report.tasks += 1;
    }

    Ok(report)
}
