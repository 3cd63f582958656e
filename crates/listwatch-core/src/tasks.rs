//! Scheduled ingestion tasks (`cron_tasks`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minutes a task may fire ahead of its nominal interval, absorbing
/// scheduler tick jitter.
pub const EARLY_TRIGGER_TOLERANCE_MINUTES: i64 = 2;

/// A recurring unit of ingestion work bound to one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Interval between runs, in minutes.
    pub frequency_minutes: i32,
    pub last_executed: Option<DateTime<Utc>>,
    /// Id of the `twitter_lists` document this task collects for.
    pub list_id: String,
}

/// Returns `true` when `task` should run at `now`.
///
/// A task that has never executed is always due. Otherwise it is due once
/// `frequency - 2` minutes have elapsed since its last execution.
#[must_use]
pub fn is_task_due(task: &ScheduledTask, now: DateTime<Utc>) -> bool {
    let Some(last) = task.last_executed else {
        return true;
    };
    let elapsed_minutes = (now - last).num_minutes();
    let threshold = i64::from(task.frequency_minutes) - EARLY_TRIGGER_TOLERANCE_MINUTES;
    elapsed_minutes >= threshold
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn task(frequency_minutes: i32, last_executed: Option<DateTime<Utc>>) -> ScheduledTask {
        ScheduledTask {
            id: "task-1".to_string(),
            name: "collector".to_string(),
            active: true,
            frequency_minutes,
            last_executed,
            list_id: "list-1".to_string(),
        }
    }

    #[test]
    fn never_executed_task_is_due() {
        assert!(is_task_due(&task(60, None), Utc::now()));
    }

    #[test]
    fn task_is_due_within_early_trigger_tolerance() {
        let now = Utc::now();
        assert!(is_task_due(&task(30, Some(now - Duration::minutes(28))), now));
    }

    #[test]
    fn task_is_not_due_before_tolerance_window() {
        let now = Utc::now();
        assert!(!is_task_due(&task(30, Some(now - Duration::minutes(27))), now));
    }

    #[test]
    fn overdue_task_is_due() {
        let now = Utc::now();
        assert!(is_task_due(&task(15, Some(now - Duration::hours(3))), now));
    }
}
