//! Which calendars a user may read and write.
//!
//! A user sees their own calendars, their couple's shared calendar, and their
//! partner's PERSONAL calendars. The partner's EXTERNAL and IMPORTED calendars
//! never cross over. Partner calendars are read-only.

use serde::Serialize;

use crate::calendar::{Calendar, CalendarKind};
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, UserId};
use crate::store::Store;
use crate::user::User;

/// How a user is related to a calendar they can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// Caller owns it
    Owner,
    /// The caller's couple owns it
    Couple,
    /// The caller's partner owns it (PERSONAL only)
    Partner,
}

impl Access {
    pub fn can_write(self) -> bool {
        matches!(self, Access::Owner | Access::Couple)
    }
}

/// The other member of `user`'s couple, if any.
pub async fn partner_of(store: &dyn Store, user: &User) -> WeTimeResult<Option<User>> {
    let Some(couple_id) = user.couple_id else {
        return Ok(None);
    };

    Ok(store
        .couple_members(couple_id)
        .await?
        .into_iter()
        .find(|member| member.id != user.id))
}

/// Every calendar `user` may read, each exactly once, with the access it grants.
/// Own calendars first, then the shared one, then the partner's.
pub async fn visible_calendars(
    store: &dyn Store,
    user: &User,
) -> WeTimeResult<Vec<(Calendar, Access)>> {
    let mut visible: Vec<(Calendar, Access)> = store
        .calendars_owned_by(user.id)
        .await?
        .into_iter()
        .map(|c| (c, Access::Owner))
        .collect();

    if let Some(couple_id) = user.couple_id {
        if let Some(shared) = store.shared_calendar(couple_id).await? {
            visible.push((shared, Access::Couple));
        }

        if let Some(partner) = partner_of(store, user).await? {
            let partner_personal = store
                .calendars_owned_by(partner.id)
                .await?
                .into_iter()
                .filter(|c| c.kind == CalendarKind::Personal)
                .map(|c| (c, Access::Partner));
            visible.extend(partner_personal);
        }
    }

    tracing::debug!(user = %user.id, calendars = visible.len(), "Resolved visible calendars");

    Ok(visible)
}

/// Ids of every calendar `user` may read.
pub async fn resolve(store: &dyn Store, user: &User) -> WeTimeResult<Vec<CalendarId>> {
    Ok(visible_calendars(store, user)
        .await?
        .into_iter()
        .map(|(c, _)| c.id)
        .collect())
}

/// How `user` may access `calendar`, or `None` if it is not visible to them.
pub async fn access_to(
    store: &dyn Store,
    user: &User,
    calendar: &Calendar,
) -> WeTimeResult<Option<Access>> {
    if calendar.is_owned_by(user.id) {
        return Ok(Some(Access::Owner));
    }

    if let Some(couple_id) = calendar.couple_id() {
        return Ok((user.couple_id == Some(couple_id)).then_some(Access::Couple));
    }

    if calendar.kind != CalendarKind::Personal {
        return Ok(None);
    }

    let partner = partner_of(store, user).await?;
    Ok(partner
        .filter(|p| calendar.is_owned_by(p.id))
        .map(|_| Access::Partner))
}

/// Load `calendar_id` and check `user` may read it.
pub async fn ensure_readable(
    store: &dyn Store,
    user: &User,
    calendar_id: CalendarId,
) -> WeTimeResult<(Calendar, Access)> {
    let calendar = store
        .calendar(calendar_id)
        .await?
        .ok_or_else(|| WeTimeError::NotFound(format!("Calendar {}", calendar_id)))?;

    match access_to(store, user, &calendar).await? {
        Some(access) => Ok((calendar, access)),
        None => Err(WeTimeError::VisibilityDenied(calendar_id.to_string())),
    }
}

/// Load `calendar_id` and check `user` may write to it.
pub async fn ensure_writable(
    store: &dyn Store,
    user: &User,
    calendar_id: CalendarId,
) -> WeTimeResult<Calendar> {
    let (calendar, access) = ensure_readable(store, user, calendar_id).await?;
    if !access.can_write() {
        return Err(WeTimeError::VisibilityDenied(calendar_id.to_string()));
    }
    Ok(calendar)
}

/// Load a user or fail with `NotFound`.
pub async fn require_user(store: &dyn Store, id: UserId) -> WeTimeResult<User> {
    store
        .user(id)
        .await?
        .ok_or_else(|| WeTimeError::NotFound(format!("User {}", id)))
}
