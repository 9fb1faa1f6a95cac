//! Calendars and their ownership.

mod manage;
mod state;

pub use manage::{
    CalendarPatch, NewCalendar, create_calendar, delete_calendar, list_calendars, update_calendar,
};
pub use state::FeedState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, CoupleId, UserId};

const PERSONAL_COLOR: &str = "#3b82f6";
const SHARED_COLOR: &str = "#10b981";
const IMPORTED_COLOR: &str = "#f59e0b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarKind {
    /// Owned by one user
    Personal,
    /// Owned by a couple, no individual owner
    Shared,
    /// Owned by one user, backed by a remote feed
    External,
    /// Owned by one user, populated once from an uploaded feed
    Imported,
}

/// Exactly one of user or couple owns a calendar; the kind decides which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum CalendarOwner {
    User(UserId),
    Couple(CoupleId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: CalendarId,
    pub name: String,
    pub color: String,
    pub kind: CalendarKind,
    pub owner: CalendarOwner,
    /// Remote feed state, present only for EXTERNAL calendars
    pub feed: Option<FeedState>,
    pub created_at: DateTime<Utc>,
}

impl Calendar {
    fn build(name: &str, color: &str, kind: CalendarKind, owner: CalendarOwner) -> Self {
        Calendar {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
            kind,
            owner,
            feed: None,
            created_at: Utc::now(),
        }
    }

    pub fn personal(owner: UserId, name: &str) -> Self {
        Self::build(name, PERSONAL_COLOR, CalendarKind::Personal, CalendarOwner::User(owner))
    }

    pub fn shared(couple: CoupleId) -> Self {
        Self::build("Shared", SHARED_COLOR, CalendarKind::Shared, CalendarOwner::Couple(couple))
    }

    pub fn imported(owner: UserId, name: &str) -> Self {
        Self::build(name, IMPORTED_COLOR, CalendarKind::Imported, CalendarOwner::User(owner))
    }

    /// An EXTERNAL calendar subscribed to `feed_url`.
    pub fn external(owner: UserId, name: &str, feed_url: &str) -> WeTimeResult<Self> {
        let mut calendar =
            Self::build(name, PERSONAL_COLOR, CalendarKind::External, CalendarOwner::User(owner));
        calendar.feed = Some(FeedState::new(feed_url)?);
        Ok(calendar)
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }

    pub fn owner_id(&self) -> Option<UserId> {
        match self.owner {
            CalendarOwner::User(id) => Some(id),
            CalendarOwner::Couple(_) => None,
        }
    }

    pub fn couple_id(&self) -> Option<CoupleId> {
        match self.owner {
            CalendarOwner::Couple(id) => Some(id),
            CalendarOwner::User(_) => None,
        }
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner_id() == Some(user)
    }

    /// Check the kind/owner/feed invariants. Used on records coming from outside
    /// the constructors (snapshots, API payloads).
    pub fn validate(&self) -> WeTimeResult<()> {
        match (self.kind, self.owner) {
            (CalendarKind::Shared, CalendarOwner::Couple(_)) => {}
            (CalendarKind::Shared, CalendarOwner::User(_)) => {
                return Err(WeTimeError::Invalid(format!(
                    "shared calendar {} must be owned by a couple",
                    self.id
                )));
            }
            (_, CalendarOwner::Couple(_)) => {
                return Err(WeTimeError::Invalid(format!(
                    "calendar {} of kind {:?} must be owned by a user",
                    self.id, self.kind
                )));
            }
            _ => {}
        }

        if self.kind == CalendarKind::External && self.feed.is_none() {
            return Err(WeTimeError::Invalid(format!(
                "external calendar {} has no feed URL",
                self.id
            )));
        }

        Ok(())
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
