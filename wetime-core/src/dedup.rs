//! Duplicate removal.
//!
//! Records sharing (calendar, start, end, title) are duplicates; the earliest
//! created one is kept.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::WeTimeResult;
use crate::event::{CalendarId, Occurrence, OccurrenceId};
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub removed_ids: Vec<OccurrenceId>,
    /// Number of keys shared by more than one record
    pub group_count: usize,
}

type DuplicateKey<'a> = (CalendarId, DateTime<Utc>, DateTime<Utc>, &'a str);

/// Find the records to remove. Pure: nothing is deleted.
pub fn find_duplicates(occurrences: &[Occurrence]) -> DuplicateReport {
    let mut groups: HashMap<DuplicateKey<'_>, Vec<&Occurrence>> = HashMap::new();
    for occ in occurrences {
        groups
            .entry((occ.calendar_id, occ.start_utc, occ.end_utc, occ.title.as_str()))
            .or_default()
            .push(occ);
    }

    let mut report = DuplicateReport::default();

    for group in groups.values_mut().filter(|g| g.len() > 1) {
        report.group_count += 1;
        group.sort_by_key(|o| o.created_at);
        report
            .removed_ids
            .extend(group.iter().skip(1).map(|o| o.id));
    }

    report.removed_ids.sort();
    report
}

/// Remove duplicates across the whole store.
pub async fn remove_duplicates(store: &dyn Store) -> WeTimeResult<DuplicateReport> {
    let all = store.all_occurrences().await?;
    let report = find_duplicates(&all);

    if !report.removed_ids.is_empty() {
        store.delete_occurrences(&report.removed_ids).await?;
    }

    tracing::info!(
        deleted = report.removed_ids.len(),
        groups = report.group_count,
        "Removed duplicate events"
    );

    Ok(report)
}
