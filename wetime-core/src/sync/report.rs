//! Results of feed synchronization, per calendar and per batch.

use serde::Serialize;

use crate::event::CalendarId;

/// Counts from one successful reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    /// Feed entries after repeated UIDs are collapsed
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Entries matching a stored record that already had the same content
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated {
        #[serde(flatten)]
        counts: SyncCounts,
    },
    NotModified,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSync {
    pub calendar_id: CalendarId,
    pub name: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Per-calendar outcomes of a batch refresh, in calendar creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport(pub Vec<CalendarSync>);

impl BatchReport {
    /// (updated, not modified, failed) calendar counts
    pub fn status_counts(&self) -> (usize, usize, usize) {
        let mut updated = 0;
        let mut not_modified = 0;
        let mut failed = 0;

        for sync in &self.0 {
            match sync.outcome {
                SyncOutcome::Updated { .. } => updated += 1,
                SyncOutcome::NotModified => not_modified += 1,
                SyncOutcome::Failed { .. } => failed += 1,
            }
        }

        (updated, not_modified, failed)
    }

    /// Feed entries processed across all calendars.
    pub fn processed(&self) -> usize {
        self.0
            .iter()
            .map(|s| match s.outcome {
                SyncOutcome::Updated { counts } => counts.processed,
                _ => 0,
            })
            .sum()
    }
}
