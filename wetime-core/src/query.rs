//! Window queries: everything a user can see between two instants.

use std::collections::HashSet;

use crate::date_range::DateRange;
use crate::error::WeTimeResult;
use crate::event::Occurrence;
use crate::recurrence;
use crate::store::Store;
use crate::user::User;
use crate::visibility;

/// The ordered occurrences visible to `user` inside `window`, recurring
/// templates replaced by their materialized instances.
pub async fn query_window(
    store: &dyn Store,
    user: &User,
    window: &DateRange,
) -> WeTimeResult<Vec<Occurrence>> {
    let calendar_ids = visibility::resolve(store, user).await?;
    if calendar_ids.is_empty() {
        return Ok(Vec::new());
    }

    let stored = store.occurrences_for_window(&calendar_ids, window).await?;
    let result = materialize(stored, window);

    tracing::debug!(
        user = %user.id,
        start = %window.start,
        end = %window.end,
        count = result.len(),
        "Window query"
    );

    Ok(result)
}

/// Turn stored records into the displayable occurrences for `window`.
///
/// Plain records pass through when they overlap the window. Templates are
/// expanded and never appear themselves; a template whose rule does not parse
/// is logged and contributes nothing. Output is sorted by start, ties keeping
/// creation order. Each stored record is considered once.
pub fn materialize(stored: Vec<Occurrence>, window: &DateRange) -> Vec<Occurrence> {
    let mut seen = HashSet::with_capacity(stored.len());
    let mut result = Vec::with_capacity(stored.len());

    for record in stored {
        if !seen.insert(record.id) {
            continue;
        }

        let Some(rule) = record.rule() else {
            if record.overlaps(window) {
                result.push(record);
            }
            continue;
        };

        match recurrence::expand(rule, record.start_utc, &record.exception_dates, window) {
            Ok(starts) => {
                result.extend(starts.into_iter().map(|t| record.instance_at(t)));
            }
            Err(e) => {
                tracing::warn!(occurrence = %record.id, error = %e, "Skipping recurrence expansion");
            }
        }
    }

    // Stable: equal keys keep the order the store returned them in
    result.sort_by_key(|o| (o.start_utc, o.created_at));
    result
}
