//! Creating, editing and deleting stored occurrences on behalf of a user.
//!
//! Writes are allowed on the caller's own calendars and the couple's shared
//! calendar. Partner calendars are read-only.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, EventSource, Occurrence, OccurrenceId, OccurrencePatch, Visibility};
use crate::recurrence;
use crate::store::Store;
use crate::user::User;
use crate::visibility::{ensure_readable, ensure_writable};

/// A new event as submitted by a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOccurrence {
    pub calendar_id: CalendarId,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub exception_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Span and rule checks shared by create and update. A rule carrying its own
/// DTSTART is rewritten so the record's start is the series anchor.
fn validate(occurrence: &mut Occurrence) -> WeTimeResult<()> {
    if occurrence.title.trim().is_empty() {
        return Err(WeTimeError::Invalid("title must not be empty".to_string()));
    }
    if occurrence.end_utc <= occurrence.start_utc {
        return Err(WeTimeError::Invalid(format!(
            "end {} must be after start {}",
            occurrence.end_utc.to_rfc3339(),
            occurrence.start_utc.to_rfc3339()
        )));
    }
    if let Some(rule) = occurrence.rule() {
        let normalized = recurrence::normalize(rule, occurrence.start_utc)?;
        let duration = occurrence.duration();
        occurrence.start_utc = normalized.anchor;
        occurrence.end_utc = normalized.anchor + duration;
        occurrence.recurrence_rule = Some(normalized.rule);
    }
    Ok(())
}

pub async fn create_event(
    store: &dyn Store,
    user: &User,
    new: NewOccurrence,
    source: EventSource,
) -> WeTimeResult<Occurrence> {
    ensure_writable(store, user, new.calendar_id).await?;

    let mut occurrence = Occurrence {
        id: Uuid::new_v4(),
        calendar_id: new.calendar_id,
        title: new.title.trim().to_string(),
        description: new.description.filter(|d| !d.trim().is_empty()),
        location: new.location.filter(|l| !l.trim().is_empty()),
        start_utc: new.start_utc,
        end_utc: new.end_utc,
        all_day: new.all_day,
        recurrence_rule: new.recurrence_rule.filter(|r| !r.trim().is_empty()),
        exception_dates: new.exception_dates,
        is_recurrence_instance: false,
        visibility: new.visibility,
        external_uid: None,
        source,
        created_by: Some(user.id),
        created_at: Utc::now(),
    };
    validate(&mut occurrence)?;

    store.save_occurrence(occurrence.clone()).await?;
    tracing::debug!(occurrence = %occurrence.id, calendar = %occurrence.calendar_id, "Created event");

    Ok(occurrence)
}

/// A stored occurrence the user may read.
pub async fn get_event(
    store: &dyn Store,
    user: &User,
    id: OccurrenceId,
) -> WeTimeResult<Occurrence> {
    let occurrence = store
        .occurrence(id)
        .await?
        .ok_or_else(|| WeTimeError::NotFound(format!("Event {}", id)))?;
    ensure_readable(store, user, occurrence.calendar_id).await?;
    Ok(occurrence)
}

pub async fn update_event(
    store: &dyn Store,
    user: &User,
    id: OccurrenceId,
    patch: OccurrencePatch,
) -> WeTimeResult<Occurrence> {
    let mut occurrence = get_event(store, user, id).await?;
    ensure_writable(store, user, occurrence.calendar_id).await?;

    occurrence.apply(patch);
    validate(&mut occurrence)?;

    store.save_occurrence(occurrence.clone()).await?;
    Ok(occurrence)
}

pub async fn delete_event(store: &dyn Store, user: &User, id: OccurrenceId) -> WeTimeResult<()> {
    let occurrence = get_event(store, user, id).await?;
    ensure_writable(store, user, occurrence.calendar_id).await?;

    store.delete_occurrences(&[id]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Calendar;
    use crate::couple::{create_couple, join_couple};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    fn draft(calendar_id: CalendarId) -> NewOccurrence {
        NewOccurrence {
            calendar_id,
            title: "Dinner".to_string(),
            description: None,
            location: Some("Home".to_string()),
            start_utc: at(1, 18),
            end_utc: at(1, 20),
            all_day: false,
            recurrence_rule: None,
            exception_dates: BTreeSet::new(),
            visibility: Visibility::Owner,
        }
    }

    /// Two linked users, each with a personal calendar.
    async fn make_couple() -> (MemoryStore, User, User, Calendar, Calendar, Calendar) {
        let store = MemoryStore::new();
        let alex = User::new("Alex", "alex@example.com", "UTC");
        let blake = User::new("Blake", "blake@example.com", "UTC");
        store.save_user(alex.clone()).await.unwrap();
        store.save_user(blake.clone()).await.unwrap();

        let (couple, shared) = create_couple(&store, alex.id).await.unwrap();
        join_couple(&store, blake.id, &couple.join_code).await.unwrap();

        let alex_cal = Calendar::personal(alex.id, "Alex");
        let blake_cal = Calendar::personal(blake.id, "Blake");
        store.save_calendar(alex_cal.clone()).await.unwrap();
        store.save_calendar(blake_cal.clone()).await.unwrap();

        let alex = store.user(alex.id).await.unwrap().unwrap();
        let blake = store.user(blake.id).await.unwrap().unwrap();
        (store, alex, blake, alex_cal, blake_cal, shared)
    }

    #[tokio::test]
    async fn test_create_on_own_and_shared_calendar() {
        let (store, alex, _, alex_cal, _, shared) = make_couple().await;

        let mine = create_event(&store, &alex, draft(alex_cal.id), EventSource::Local)
            .await
            .unwrap();
        assert_eq!(mine.created_by, Some(alex.id));
        assert_eq!(mine.source, EventSource::Local);

        create_event(&store, &alex, draft(shared.id), EventSource::Local)
            .await
            .unwrap();
        assert_eq!(store.all_occurrences().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_partner_calendar_rejects_writes() {
        let (store, alex, blake, _, blake_cal, _) = make_couple().await;

        let err = create_event(&store, &alex, draft(blake_cal.id), EventSource::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::VisibilityDenied(_)));

        let blakes = create_event(&store, &blake, draft(blake_cal.id), EventSource::Local)
            .await
            .unwrap();

        // Readable but not writable for the partner
        get_event(&store, &alex, blakes.id).await.unwrap();
        let err = delete_event(&store, &alex, blakes.id).await.unwrap_err();
        assert!(matches!(err, WeTimeError::VisibilityDenied(_)));
        let err = update_event(&store, &alex, blakes.id, OccurrencePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::VisibilityDenied(_)));
    }

    #[tokio::test]
    async fn test_create_validates_span_and_rule() {
        let (store, alex, _, alex_cal, _, _) = make_couple().await;

        let mut backwards = draft(alex_cal.id);
        backwards.end_utc = backwards.start_utc;
        let err = create_event(&store, &alex, backwards, EventSource::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::Invalid(_)));

        let mut bad_rule = draft(alex_cal.id);
        bad_rule.recurrence_rule = Some("FREQ=FORTNIGHTLY".to_string());
        let err = create_event(&store, &alex, bad_rule, EventSource::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::InvalidRule { .. }));

        assert!(store.all_occurrences().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rule_with_own_dtstart_is_stored_anchored() {
        let (store, alex, _, alex_cal, _, _) = make_couple().await;

        let mut monthly = draft(alex_cal.id);
        monthly.recurrence_rule =
            Some("DTSTART:20240115T070000Z\nRRULE:FREQ=MONTHLY;BYMONTHDAY=15".to_string());
        let created = create_event(&store, &alex, monthly, EventSource::Local)
            .await
            .unwrap();

        assert_eq!(created.rule(), Some("FREQ=MONTHLY;BYMONTHDAY=15"));
        assert_eq!(created.start_utc, Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap());
        assert_eq!(created.duration(), chrono::Duration::hours(2));
        assert_eq!(store.occurrence(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_and_delete_own_event() {
        let (store, alex, _, alex_cal, _, _) = make_couple().await;
        let created = create_event(&store, &alex, draft(alex_cal.id), EventSource::Local)
            .await
            .unwrap();

        let updated = update_event(
            &store,
            &alex,
            created.id,
            OccurrencePatch {
                title: Some("Late dinner".to_string()),
                start_utc: Some(at(1, 20)),
                end_utc: Some(at(1, 22)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Late dinner");
        assert_eq!(updated.created_at, created.created_at);

        let err = update_event(
            &store,
            &alex,
            created.id,
            OccurrencePatch {
                end_utc: Some(at(1, 19)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WeTimeError::Invalid(_)));

        delete_event(&store, &alex, created.id).await.unwrap();
        let err = get_event(&store, &alex, created.id).await.unwrap_err();
        assert!(matches!(err, WeTimeError::NotFound(_)));
    }
}
