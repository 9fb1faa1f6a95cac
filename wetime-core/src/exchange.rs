//! One-off ICS import and export.

use serde::Serialize;

use crate::calendar::Calendar;
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, EventSource};
use crate::ics::{generate_feed, parse_feed};
use crate::store::Store;
use crate::user::User;
use crate::visibility::ensure_readable;

const IMPORTED_CALENDAR_NAME: &str = "Imported";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub calendar_id: CalendarId,
    pub imported: usize,
}

/// Create an IMPORTED calendar for `user` holding every entry of `text`.
pub async fn import_feed(store: &dyn Store, user: &User, text: &str) -> WeTimeResult<ImportSummary> {
    if text.trim().is_empty() {
        return Err(WeTimeError::Invalid("invalid_ics".to_string()));
    }

    // Parse first so a non-calendar upload leaves no empty calendar behind
    let entries = parse_feed(text)?;

    let calendar = Calendar::imported(user.id, IMPORTED_CALENDAR_NAME);
    store.save_calendar(calendar.clone()).await?;

    let occurrences: Vec<_> = entries
        .into_iter()
        .map(|entry| entry.into_occurrence(calendar.id, EventSource::Imported, Some(user.id)))
        .collect();
    let imported = occurrences.len();

    if let Err(e) = store.save_occurrences(occurrences).await {
        // Don't leave an empty IMPORTED calendar behind a failed import
        if let Err(cleanup) = store.delete_calendar(calendar.id).await {
            tracing::warn!(
                calendar = %calendar,
                error = %cleanup,
                "Failed to remove calendar of failed import"
            );
        }
        return Err(e);
    }

    tracing::info!(user = %user.id, calendar = %calendar, imported, "Imported feed");

    Ok(ImportSummary {
        calendar_id: calendar.id,
        imported,
    })
}

/// Export every stored occurrence of a readable calendar. Returns the calendar
/// alongside the feed text so callers can name the download.
pub async fn export_calendar(
    store: &dyn Store,
    user: &User,
    calendar_id: CalendarId,
) -> WeTimeResult<(Calendar, String)> {
    let (calendar, _) = ensure_readable(store, user, calendar_id).await?;
    let occurrences = store.occurrences_in_calendar(calendar_id).await?;

    let feed = generate_feed(&occurrences)?;
    tracing::debug!(calendar = %calendar, events = occurrences.len(), "Exported calendar");

    Ok((calendar, feed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarKind;
    use crate::event::Occurrence;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:trip-1\r\n\
SUMMARY:Flight\r\n\
DTSTART:20240710T060000Z\r\n\
DTEND:20240710T090000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:trip-2\r\n\
SUMMARY:Hotel\r\n\
DTSTART;VALUE=DATE:20240710\r\n\
DTEND;VALUE=DATE:20240713\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    async fn make_user(store: &MemoryStore) -> User {
        let user = User::new("Sam", "sam@example.com", "UTC");
        store.save_user(user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_import_creates_imported_calendar() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;

        let summary = import_feed(&store, &user, FEED).await.unwrap();
        assert_eq!(summary.imported, 2);

        let calendar = store.calendar(summary.calendar_id).await.unwrap().unwrap();
        assert_eq!(calendar.kind, CalendarKind::Imported);
        assert_eq!(calendar.name, "Imported");
        assert!(calendar.is_owned_by(user.id));

        let stored = store.occurrences_in_calendar(calendar.id).await.unwrap();
        assert!(stored.iter().all(|o| o.source == EventSource::Imported));
        assert!(stored.iter().all(|o| o.created_by == Some(user.id)));
    }

    #[tokio::test]
    async fn test_import_rejects_empty_and_non_calendar_text() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;

        let err = import_feed(&store, &user, "  ").await.unwrap_err();
        assert!(matches!(err, WeTimeError::Invalid(_)));

        let err = import_feed(&store, &user, "hello").await.unwrap_err();
        assert!(matches!(err, WeTimeError::FeedParse(_)));

        assert!(store.calendars_owned_by(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_round_trips_through_import() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;
        let calendar = Calendar::personal(user.id, "Mine");
        store.save_calendar(calendar.clone()).await.unwrap();
        let occ = Occurrence::new(
            calendar.id,
            "Concert",
            Utc.with_ymd_and_hms(2024, 8, 1, 19, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 8, 1, 22, 0, 0).unwrap(),
        );
        store.save_occurrence(occ.clone()).await.unwrap();

        let (exported_from, feed) = export_calendar(&store, &user, calendar.id).await.unwrap();
        assert_eq!(exported_from.id, calendar.id);
        assert!(feed.contains(&format!("UID:{}", occ.id)));

        let summary = import_feed(&store, &user, &feed).await.unwrap();
        let imported = store
            .occurrences_in_calendar(summary.calendar_id)
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].title, "Concert");
        assert_eq!(imported[0].start_utc, occ.start_utc);
        assert_eq!(imported[0].end_utc, occ.end_utc);
        assert_eq!(imported[0].external_uid, Some(occ.id.to_string()));
    }

    #[tokio::test]
    async fn test_export_of_invisible_calendar_is_denied() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;
        let foreign = Calendar::personal(uuid::Uuid::new_v4(), "Theirs");
        store.save_calendar(foreign.clone()).await.unwrap();

        let err = export_calendar(&store, &user, foreign.id).await.unwrap_err();
        assert!(matches!(err, WeTimeError::VisibilityDenied(_)));
    }
}
