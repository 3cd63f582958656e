//! Process-scoped daily operation counter.
//!
//! Counts external operations (store reads/writes, tweet-source pages, LLM
//! calls) for the current UTC day. The window resets lazily: every call
//! compares the stored day against the current one.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    StoreRead,
    StoreWrite,
    SourceRequest,
    LlmRequest,
}

/// Snapshot of one day's counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageWindow {
    pub date: NaiveDate,
    pub counts: BTreeMap<OpKind, u64>,
}

impl UsageWindow {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            counts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn count(&self, kind: OpKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct UsageCounter {
    window: Mutex<UsageWindow>,
}

impl Default for UsageCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Mutex::new(UsageWindow::empty(Utc::now().date_naive())),
        }
    }

    pub fn record_op(&self, kind: OpKind) {
        self.record_ops_at(kind, 1, Utc::now());
    }

    pub fn record_ops(&self, kind: OpKind, n: u64) {
        self.record_ops_at(kind, n, Utc::now());
    }

    pub fn record_ops_at(&self, kind: OpKind, n: u64, now: DateTime<Utc>) {
        let mut window = self.rolled(now);
        *window.counts.entry(kind).or_insert(0) += n;
    }

    #[must_use]
    pub fn current_window(&self) -> UsageWindow {
        self.current_window_at(Utc::now())
    }

    #[must_use]
    pub fn current_window_at(&self, now: DateTime<Utc>) -> UsageWindow {
        self.rolled(now).clone()
    }

    /// Locks the window, resetting it first if `now` falls on a later day.
    fn rolled(&self, now: DateTime<Utc>) -> MutexGuard<'_, UsageWindow> {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let today = now.date_naive();
        if window.date != today {
            *window = UsageWindow::empty(today);
        }
        window
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn counts_accumulate_within_a_day() {
        let counter = UsageCounter::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        counter.record_ops_at(OpKind::StoreRead, 3, now);
        counter.record_ops_at(OpKind::StoreRead, 2, now + Duration::hours(2));
        counter.record_ops_at(OpKind::LlmRequest, 1, now);

        let window = counter.current_window_at(now + Duration::hours(3));
        assert_eq!(window.count(OpKind::StoreRead), 5);
        assert_eq!(window.count(OpKind::LlmRequest), 1);
        assert_eq!(window.count(OpKind::StoreWrite), 0);
    }

    #[test]
    fn window_resets_when_the_date_changes() {
        let counter = UsageCounter::new();
        let day_one = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        counter.record_ops_at(OpKind::SourceRequest, 7, day_one);

        let day_two = day_one + Duration::minutes(2);
        let window = counter.current_window_at(day_two);
        assert_eq!(window.date, day_two.date_naive());
        assert_eq!(window.count(OpKind::SourceRequest), 0);
    }
}
