//! Per-user attendance on events ("is my partner coming?").
//!
//! Anyone who can read an event may answer for themselves. Answers on a
//! recurring event apply to the whole series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WeTimeResult;
use crate::event::{OccurrenceId, UserId};
use crate::events::get_event;
use crate::store::Store;
use crate::user::User;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Accepted,
    Declined,
    Tentative,
    #[default]
    NeedsAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub event_id: OccurrenceId,
    pub user_id: UserId,
    pub status: AttendanceStatus,
    pub updated_at: DateTime<Utc>,
}

/// Record `user`'s answer for `event_id`, replacing any earlier one.
pub async fn set_attendance(
    store: &dyn Store,
    user: &User,
    event_id: OccurrenceId,
    status: AttendanceStatus,
    now: DateTime<Utc>,
) -> WeTimeResult<Attendee> {
    let event = get_event(store, user, event_id).await?;

    let attendee = Attendee {
        event_id: event.id,
        user_id: user.id,
        status,
        updated_at: now,
    };
    store.save_attendee(attendee.clone()).await?;

    tracing::debug!(event = %event.id, user = %user.id, ?status, "Attendance recorded");
    Ok(attendee)
}

/// Every answer on an event the user can read.
pub async fn attendees(
    store: &dyn Store,
    user: &User,
    event_id: OccurrenceId,
) -> WeTimeResult<Vec<Attendee>> {
    get_event(store, user, event_id).await?;
    store.attendees_for(event_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Calendar;
    use crate::couple::{create_couple, join_couple};
    use crate::error::WeTimeError;
    use crate::event::Occurrence;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 7, h, 0, 0).unwrap()
    }

    async fn make_pair(store: &MemoryStore) -> (User, User) {
        let alex = User::new("Alex", "alex@example.com", "UTC");
        let blake = User::new("Blake", "blake@example.com", "UTC");
        store.save_user(alex.clone()).await.unwrap();
        store.save_user(blake.clone()).await.unwrap();
        let (couple, _) = create_couple(store, alex.id).await.unwrap();
        join_couple(store, blake.id, &couple.join_code).await.unwrap();
        (
            store.user(alex.id).await.unwrap().unwrap(),
            store.user(blake.id).await.unwrap().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_partner_answers_on_readable_event() {
        let store = MemoryStore::new();
        let (alex, blake) = make_pair(&store).await;
        let calendar = Calendar::personal(alex.id, "Alex");
        store.save_calendar(calendar.clone()).await.unwrap();
        let dinner = Occurrence::new(calendar.id, "Dinner at Mum's", at(18), at(21));
        store.save_occurrence(dinner.clone()).await.unwrap();

        set_attendance(&store, &blake, dinner.id, AttendanceStatus::Tentative, at(9))
            .await
            .unwrap();
        set_attendance(&store, &blake, dinner.id, AttendanceStatus::Accepted, at(10))
            .await
            .unwrap();

        let answers = attendees(&store, &alex, dinner.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].user_id, blake.id);
        assert_eq!(answers[0].status, AttendanceStatus::Accepted);
        assert_eq!(answers[0].updated_at, at(10));
    }

    #[tokio::test]
    async fn test_stranger_cannot_answer_and_answers_go_with_the_event() {
        let store = MemoryStore::new();
        let (alex, _) = make_pair(&store).await;
        let stranger = User::new("Casey", "casey@example.com", "UTC");
        store.save_user(stranger.clone()).await.unwrap();
        let calendar = Calendar::personal(alex.id, "Alex");
        store.save_calendar(calendar.clone()).await.unwrap();
        let event = Occurrence::new(calendar.id, "Gym", at(7), at(8));
        store.save_occurrence(event.clone()).await.unwrap();

        let err = set_attendance(&store, &stranger, event.id, AttendanceStatus::Accepted, at(6))
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::VisibilityDenied(_)));

        set_attendance(&store, &alex, event.id, AttendanceStatus::Declined, at(6))
            .await
            .unwrap();
        store.delete_occurrences(&[event.id]).await.unwrap();
        assert!(store.attendees_for(event.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AttendanceStatus::NeedsAction).unwrap(),
            "\"needsAction\""
        );
        let parsed: AttendanceStatus = serde_json::from_str("\"declined\"").unwrap();
        assert_eq!(parsed, AttendanceStatus::Declined);
    }
}
