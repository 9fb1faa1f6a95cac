//! Read-only listings of the whole store for admin users.

use std::collections::HashMap;

use serde::Serialize;

use crate::calendar::Calendar;
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, Occurrence, UserId};
use crate::store::Store;
use crate::user::{Couple, User};

/// Fail with `VisibilityDenied` unless `user` is an admin.
pub fn ensure_admin(user: &User) -> WeTimeResult<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(WeTimeError::VisibilityDenied("admin access required".to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    #[serde(flatten)]
    pub user: User,
    pub calendar_count: usize,
    pub event_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoupleOverview {
    #[serde(flatten)]
    pub couple: Couple,
    pub members: Vec<MemberSummary>,
    pub shared_calendar_id: Option<CalendarId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarOverview {
    #[serde(flatten)]
    pub calendar: Calendar,
    pub event_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOverview {
    #[serde(flatten)]
    pub occurrence: Occurrence,
    pub attendee_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<EventOverview>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Events stored per calendar.
fn events_per_calendar(occurrences: &[Occurrence]) -> HashMap<CalendarId, usize> {
    let mut counts = HashMap::new();
    for occ in occurrences {
        *counts.entry(occ.calendar_id).or_insert(0) += 1;
    }
    counts
}

/// Every user, newest first, with how many calendars and events they own.
pub async fn list_users(store: &dyn Store) -> WeTimeResult<Vec<UserOverview>> {
    let calendars = store.calendars().await?;
    let per_calendar = events_per_calendar(&store.all_occurrences().await?);

    let mut users: Vec<UserOverview> = store
        .users()
        .await?
        .into_iter()
        .map(|user| {
            let owned: Vec<&Calendar> = calendars.iter().filter(|c| c.is_owned_by(user.id)).collect();
            UserOverview {
                calendar_count: owned.len(),
                event_count: owned
                    .iter()
                    .map(|c| per_calendar.get(&c.id).copied().unwrap_or(0))
                    .sum(),
                user,
            }
        })
        .collect();

    users.reverse();
    Ok(users)
}

/// Every couple, newest first, with its members and shared calendar.
pub async fn list_couples(store: &dyn Store) -> WeTimeResult<Vec<CoupleOverview>> {
    let mut overviews = Vec::new();

    for couple in store.couples().await?.into_iter().rev() {
        let members = store
            .couple_members(couple.id)
            .await?
            .into_iter()
            .map(|u| MemberSummary {
                id: u.id,
                name: u.name,
                email: u.email,
            })
            .collect();
        let shared_calendar_id = store.shared_calendar(couple.id).await?.map(|c| c.id);

        overviews.push(CoupleOverview {
            couple,
            members,
            shared_calendar_id,
        });
    }

    Ok(overviews)
}

/// Every calendar, newest first, with its stored event count.
pub async fn list_calendars(store: &dyn Store) -> WeTimeResult<Vec<CalendarOverview>> {
    let per_calendar = events_per_calendar(&store.all_occurrences().await?);

    Ok(store
        .calendars()
        .await?
        .into_iter()
        .rev()
        .map(|calendar| CalendarOverview {
            event_count: per_calendar.get(&calendar.id).copied().unwrap_or(0),
            calendar,
        })
        .collect())
}

/// One page of stored events, newest first.
pub async fn list_events(store: &dyn Store, limit: usize, offset: usize) -> WeTimeResult<EventPage> {
    let mut all = store.all_occurrences().await?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = all.len();

    let mut events = Vec::new();
    for occurrence in all.into_iter().skip(offset).take(limit) {
        let attendee_count = store.attendees_for(occurrence.id).await?.len();
        events.push(EventOverview {
            occurrence,
            attendee_count,
        });
    }

    Ok(EventPage {
        events,
        total,
        limit,
        offset,
    })
}
