//! External feed synchronization.
//!
//! Pulls an EXTERNAL calendar's feed and upserts its entries keyed by
//! (calendar, UID). Entries without a UID cannot be matched to an earlier
//! sync and are inserted every time. A feed repeating a UID is read as one
//! entry, the last block winning.

mod fetch;
mod report;

pub use fetch::{FeedFetcher, FetchOutcome, HttpFeedFetcher};
pub use report::{BatchReport, CalendarSync, SyncCounts, SyncOutcome};

use std::collections::HashMap;

use chrono::Utc;
use futures::future::join_all;

use crate::calendar::{Calendar, CalendarKind};
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, EventSource, Occurrence};
use crate::ics::{ParsedOccurrence, parse_feed};
use crate::store::Store;
use crate::user::User;

/// Fetch and reconcile one calendar's feed.
pub async fn sync_calendar(
    store: &dyn Store,
    fetcher: &dyn FeedFetcher,
    calendar: &Calendar,
) -> WeTimeResult<SyncOutcome> {
    let Some(feed) = calendar.feed.as_ref() else {
        return Err(WeTimeError::Invalid("not_external".to_string()));
    };

    tracing::debug!(calendar = %calendar, url = %feed.url, "Fetching feed");

    let (outcome, etag) = match fetcher.fetch(&feed.fetch_url(), feed.etag.as_deref()).await? {
        FetchOutcome::NotModified => (SyncOutcome::NotModified, None),
        FetchOutcome::Fetched { body, etag } => {
            let entries = parse_feed(&body)?;
            let counts = upsert_entries(store, calendar, entries).await?;
            (SyncOutcome::Updated { counts }, etag)
        }
    };

    // Reload so fields edited while we were fetching are not overwritten
    let mut latest = store
        .calendar(calendar.id)
        .await?
        .unwrap_or_else(|| calendar.clone());
    if let Some(state) = latest.feed.as_mut() {
        state.mark_fetched(Utc::now(), etag);
    }
    store.save_calendar(latest).await?;

    Ok(outcome)
}

/// Insert or update every parsed entry in `calendar` with one store write.
pub async fn upsert_entries(
    store: &dyn Store,
    calendar: &Calendar,
    entries: Vec<ParsedOccurrence>,
) -> WeTimeResult<SyncCounts> {
    let entries = collapse_by_uid(entries);
    let mut counts = SyncCounts {
        processed: entries.len(),
        ..Default::default()
    };

    let mut by_uid: HashMap<String, Occurrence> = HashMap::new();
    for stored in store.occurrences_in_calendar(calendar.id).await? {
        if let Some(uid) = stored.external_uid.clone().filter(|uid| !uid.is_empty()) {
            by_uid.entry(uid).or_insert(stored);
        }
    }

    let mut changed = Vec::new();
    for entry in entries {
        let existing = entry
            .external_uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .and_then(|uid| by_uid.get(uid));

        match existing {
            Some(stored) => {
                let mut updated = stored.clone();
                entry.apply_to(&mut updated);
                if &updated == stored {
                    counts.unchanged += 1;
                } else {
                    changed.push(updated);
                    counts.updated += 1;
                }
            }
            None => {
                changed.push(entry.into_occurrence(
                    calendar.id,
                    EventSource::External,
                    calendar.owner_id(),
                ));
                counts.inserted += 1;
            }
        }
    }

    store.save_occurrences(changed).await?;
    Ok(counts)
}

/// Keep one entry per UID, the last one in the feed, at the position the UID
/// first appeared. Entries without a UID are all kept.
fn collapse_by_uid(entries: Vec<ParsedOccurrence>) -> Vec<ParsedOccurrence> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ParsedOccurrence> = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(uid) = entry.external_uid.clone().filter(|uid| !uid.is_empty()) else {
            kept.push(entry);
            continue;
        };
        match slots.get(&uid) {
            Some(&i) => kept[i] = entry,
            None => {
                slots.insert(uid, kept.len());
                kept.push(entry);
            }
        }
    }

    kept
}

/// Refresh every EXTERNAL calendar concurrently.
///
/// One calendar failing is recorded in its report entry and does not affect the
/// others.
pub async fn sync_all(store: &dyn Store, fetcher: &dyn FeedFetcher) -> WeTimeResult<BatchReport> {
    let calendars: Vec<Calendar> = store
        .external_calendars()
        .await?
        .into_iter()
        .filter(|c| c.feed.is_some())
        .collect();

    let results = join_all(calendars.iter().map(|calendar| async move {
        let outcome = match sync_calendar(store, fetcher, calendar).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(calendar = %calendar, error = %e, "Feed refresh failed");
                SyncOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        CalendarSync {
            calendar_id: calendar.id,
            name: calendar.name.clone(),
            outcome,
        }
    }))
    .await;

    let report = BatchReport(results);
    let (updated, not_modified, failed) = report.status_counts();
    tracing::info!(
        updated,
        not_modified,
        failed,
        events = report.processed(),
        "Refreshed external calendars"
    );

    Ok(report)
}

/// Owner-triggered refresh of a single calendar.
pub async fn refresh_calendar(
    store: &dyn Store,
    fetcher: &dyn FeedFetcher,
    user: &User,
    calendar_id: CalendarId,
) -> WeTimeResult<SyncOutcome> {
    let calendar = store
        .calendar(calendar_id)
        .await?
        .filter(|c| c.is_owned_by(user.id))
        .ok_or_else(|| WeTimeError::NotFound(format!("Calendar {}", calendar_id)))?;

    if calendar.kind != CalendarKind::External || calendar.feed.is_none() {
        return Err(WeTimeError::Invalid("not_external".to_string()));
    }

    sync_calendar(store, fetcher, &calendar).await
}
