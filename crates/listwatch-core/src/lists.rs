use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::analysis::{AnalysisFrequency, DEFAULT_MAX_TWEETS, DEFAULT_MIN_TWEETS};
use crate::ConfigError;

fn default_true() -> bool {
    true
}

fn default_min_tweets() -> i32 {
    DEFAULT_MIN_TWEETS
}

fn default_max_tweets() -> i32 {
    DEFAULT_MAX_TWEETS
}

/// Analysis settings for a seeded list. The template is referenced by name
/// and resolved to an id when the seed is applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisSeed {
    #[serde(default)]
    pub enabled: bool,
    pub template: Option<String>,
    #[serde(default)]
    pub frequency: AnalysisFrequency,
    #[serde(default = "default_min_tweets")]
    pub min_tweets: i32,
    #[serde(default = "default_max_tweets")]
    pub max_tweets: i32,
}

/// The scheduled collection task bound to a seeded list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskSeed {
    pub id: String,
    pub name: Option<String>,
    pub frequency_minutes: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListSeed {
    pub id: String,
    pub source_list_id: String,
    pub name: String,
    pub analysis: Option<AnalysisSeed>,
    pub task: TaskSeed,
}

#[derive(Debug, Deserialize)]
pub struct ListsFile {
    pub lists: Vec<ListSeed>,
}

/// Load and validate the list seed file from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_lists(path: &Path) -> Result<ListsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ListsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_lists(&content)
}

/// Parse and validate list seed YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_lists(content: &str) -> Result<ListsFile, ConfigError> {
    let lists_file: ListsFile = serde_yaml::from_str(content)?;
    validate_lists(&lists_file)?;
    Ok(lists_file)
}

fn validate_lists(lists_file: &ListsFile) -> Result<(), ConfigError> {
    let mut seen_lists = HashSet::new();
    let mut seen_tasks = HashSet::new();

    for list in &lists_file.lists {
        if list.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "list id must be non-empty".to_string(),
            ));
        }
        if list.source_list_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "list '{}' has an empty source_list_id",
                list.id
            )));
        }
        if !seen_lists.insert(list.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate list id: '{}'",
                list.id
            )));
        }

        let task = &list.task;
        if task.id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "list '{}' has a task with an empty id",
                list.id
            )));
        }
        if !seen_tasks.insert(task.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate task id: '{}'",
                task.id
            )));
        }
        if task.frequency_minutes < 1 {
            return Err(ConfigError::Validation(format!(
                "task '{}' has invalid frequency_minutes {}; must be at least 1",
                task.id, task.frequency_minutes
            )));
        }

        if let Some(analysis) = &list.analysis {
            if analysis.min_tweets < 1 || analysis.min_tweets > analysis.max_tweets {
                return Err(ConfigError::Validation(format!(
                    "list '{}' has min_tweets {} and max_tweets {}; need 1 <= min <= max",
                    list.id, analysis.min_tweets, analysis.max_tweets
                )));
            }
            if analysis.enabled && analysis.template.is_none() {
                return Err(ConfigError::Validation(format!(
                    "list '{}' enables analysis without naming a template",
                    list.id
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LISTS: &str = r"
lists:
  - id: tech
    source_list_id: '1001'
    name: Tech
    analysis:
      enabled: true
      template: Sentiment
      frequency: hourly
    task:
      id: collect-tech
      frequency_minutes: 30
  - id: news
    source_list_id: '1002'
    name: News
    task:
      id: collect-news
      frequency_minutes: 60
      active: false
";

    #[test]
    fn parses_lists_with_defaults() {
        let file = parse_lists(TWO_LISTS).unwrap();
        assert_eq!(file.lists.len(), 2);

        let tech = &file.lists[0];
        let analysis = tech.analysis.as_ref().unwrap();
        assert_eq!(analysis.frequency, AnalysisFrequency::Hourly);
        assert_eq!(analysis.min_tweets, DEFAULT_MIN_TWEETS);
        assert_eq!(analysis.max_tweets, DEFAULT_MAX_TWEETS);
        assert!(tech.task.active);

        let news = &file.lists[1];
        assert!(news.analysis.is_none());
        assert!(!news.task.active);
    }

    #[test]
    fn rejects_duplicate_list_ids() {
        let yaml = TWO_LISTS.replace("id: news", "id: tech");
        let err = parse_lists(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate list id"));
    }

    #[test]
    fn rejects_zero_frequency() {
        let yaml = TWO_LISTS.replace("frequency_minutes: 30", "frequency_minutes: 0");
        let err = parse_lists(&yaml).unwrap_err();
        assert!(err.to_string().contains("frequency_minutes 0"));
    }

    #[test]
    fn rejects_min_above_max() {
        let yaml = TWO_LISTS.replace(
            "frequency: hourly",
            "frequency: hourly\n      min_tweets: 60\n      max_tweets: 10",
        );
        let err = parse_lists(&yaml).unwrap_err();
        assert!(err.to_string().contains("min_tweets 60"));
    }

    #[test]
    fn rejects_enabled_analysis_without_template() {
        let yaml = TWO_LISTS.replace("      template: Sentiment\n", "");
        let err = parse_lists(&yaml).unwrap_err();
        assert!(err.to_string().contains("without naming a template"));
    }

    #[test]
    fn load_lists_from_real_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("lists.yaml");
        let result = load_lists(&path);
        assert!(result.is_ok(), "failed to load lists.yaml: {result:?}");
        assert!(!result.unwrap().lists.is_empty());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_lists(Path::new("/nonexistent/lists.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ListsFileIo { .. }));
        assert!(err.to_string().contains("/nonexistent/lists.yaml"));
    }
}
