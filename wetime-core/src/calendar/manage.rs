//! Calendar listing, creation, renaming and deletion for a user.

use serde::Deserialize;

use super::{Calendar, CalendarKind};
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::CalendarId;
use crate::store::Store;
use crate::user::User;
use crate::visibility::{Access, ensure_writable, visible_calendars};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendar {
    #[serde(alias = "type")]
    pub kind: CalendarKind,
    pub name: String,
    pub color: Option<String>,
    pub feed_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Visible calendars in creation order, with the access each grants.
pub async fn list_calendars(
    store: &dyn Store,
    user: &User,
) -> WeTimeResult<Vec<(Calendar, Access)>> {
    let mut calendars = visible_calendars(store, user).await?;
    calendars.sort_by_key(|(c, _)| c.created_at);
    Ok(calendars)
}

/// Create a PERSONAL, EXTERNAL or SHARED calendar.
///
/// IMPORTED calendars only come from an import. A couple has a single SHARED
/// calendar, made with the couple.
pub async fn create_calendar(
    store: &dyn Store,
    user: &User,
    new: NewCalendar,
) -> WeTimeResult<Calendar> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(WeTimeError::Invalid("calendar name must not be empty".to_string()));
    }

    let calendar = match new.kind {
        CalendarKind::Personal => Calendar::personal(user.id, name),
        CalendarKind::External => {
            let url = new
                .feed_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| WeTimeError::Invalid("external calendar needs a feed URL".to_string()))?;
            Calendar::external(user.id, name, url)?
        }
        CalendarKind::Shared => {
            let couple_id = user
                .couple_id
                .ok_or_else(|| WeTimeError::Couple("not in a couple".to_string()))?;
            if store.shared_calendar(couple_id).await?.is_some() {
                return Err(WeTimeError::Couple("couple already has a shared calendar".to_string()));
            }
            let mut shared = Calendar::shared(couple_id);
            shared.name = name.to_string();
            shared
        }
        CalendarKind::Imported => {
            return Err(WeTimeError::Invalid(
                "imported calendars are created by importing a feed".to_string(),
            ));
        }
    };

    let calendar = match new.color {
        Some(color) => calendar.with_color(&color),
        None => calendar,
    };
    calendar.validate()?;

    store.save_calendar(calendar.clone()).await?;
    tracing::info!(user = %user.id, calendar = %calendar, kind = ?calendar.kind, "Created calendar");

    Ok(calendar)
}

pub async fn update_calendar(
    store: &dyn Store,
    user: &User,
    id: CalendarId,
    patch: CalendarPatch,
) -> WeTimeResult<Calendar> {
    let mut calendar = ensure_writable(store, user, id).await?;

    if let Some(name) = patch.name.filter(|n| !n.trim().is_empty()) {
        calendar.name = name.trim().to_string();
    }
    if let Some(color) = patch.color {
        calendar.color = color;
    }

    store.save_calendar(calendar.clone()).await?;
    Ok(calendar)
}

/// Delete one of the user's calendars and everything in it.
pub async fn delete_calendar(store: &dyn Store, user: &User, id: CalendarId) -> WeTimeResult<()> {
    let calendar = ensure_writable(store, user, id).await?;
    if calendar.kind == CalendarKind::Shared {
        return Err(WeTimeError::Invalid(
            "the shared calendar belongs to the couple".to_string(),
        ));
    }

    store.delete_calendar(id).await?;
    tracing::info!(user = %user.id, calendar = %calendar, "Deleted calendar");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::couple::create_couple;
    use crate::event::Occurrence;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn new_calendar(kind: CalendarKind, feed_url: Option<&str>) -> NewCalendar {
        NewCalendar {
            kind,
            name: "Mine".to_string(),
            color: None,
            feed_url: feed_url.map(String::from),
        }
    }

    async fn make_user(store: &MemoryStore) -> User {
        let user = User::new("Sam", "sam@example.com", "UTC");
        store.save_user(user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_create_each_kind() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;

        let personal = create_calendar(&store, &user, new_calendar(CalendarKind::Personal, None))
            .await
            .unwrap();
        assert!(personal.is_owned_by(user.id));

        let err = create_calendar(&store, &user, new_calendar(CalendarKind::External, None))
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::Invalid(_)));

        let external = create_calendar(
            &store,
            &user,
            new_calendar(CalendarKind::External, Some("webcal://example.com/feed.ics")),
        )
        .await
        .unwrap();
        assert_eq!(
            external.feed.unwrap().fetch_url(),
            "https://example.com/feed.ics"
        );

        let err = create_calendar(&store, &user, new_calendar(CalendarKind::Imported, None))
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::Invalid(_)));

        let err = create_calendar(&store, &user, new_calendar(CalendarKind::Shared, None))
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::Couple(_)));
    }

    #[tokio::test]
    async fn test_second_shared_calendar_is_rejected() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;
        create_couple(&store, user.id).await.unwrap();
        let user = store.user(user.id).await.unwrap().unwrap();

        let err = create_calendar(&store, &user, new_calendar(CalendarKind::Shared, None))
            .await
            .unwrap_err();
        assert!(matches!(err, WeTimeError::Couple(_)));
    }

    #[tokio::test]
    async fn test_list_is_in_creation_order() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;
        let mut first = Calendar::personal(user.id, "First");
        first.created_at = Utc::now() - chrono::Duration::days(1);
        let second = Calendar::personal(user.id, "Second");
        store.save_calendar(second.clone()).await.unwrap();
        store.save_calendar(first.clone()).await.unwrap();

        let names: Vec<String> = list_calendars(&store, &user)
            .await
            .unwrap()
            .into_iter()
            .map(|(c, _)| c.name)
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let store = MemoryStore::new();
        let user = make_user(&store).await;
        let calendar = create_calendar(&store, &user, new_calendar(CalendarKind::Personal, None))
            .await
            .unwrap();
        store
            .save_occurrence(Occurrence::new(calendar.id, "A", Utc::now(), Utc::now()))
            .await
            .unwrap();

        let renamed = update_calendar(
            &store,
            &user,
            calendar.id,
            CalendarPatch {
                name: Some("Renamed".to_string()),
                color: Some("#000000".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Renamed");
        assert_eq!(renamed.color, "#000000");

        delete_calendar(&store, &user, calendar.id).await.unwrap();
        assert!(store.calendar(calendar.id).await.unwrap().is_none());
        assert!(store.all_occurrences().await.unwrap().is_empty());
    }
}
