//! Users, couples and notification preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{CoupleId, UserId};

/// An identity the engine depends on. Credentials live outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// IANA zone name, e.g. "Europe/Berlin"
    pub time_zone: String,
    pub couple_id: Option<CoupleId>,
    /// May run store-wide maintenance such as duplicate cleanup
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, time_zone: &str) -> Self {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            time_zone: time_zone.to_string(),
            couple_id: None,
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    /// The user's zone, UTC when the stored name is not a known zone.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.time_zone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Render an instant as wall-clock time in the user's zone.
    pub fn local_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz())
            .format("%a %b %-d, %H:%M %Z")
            .to_string()
    }
}

/// Two users linked by a join code. Owns exactly one SHARED calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Couple {
    pub id: CoupleId,
    pub join_code: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user reminder settings. A missing lead time disables reminders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreference {
    pub reminder_minutes_before: Option<u32>,
    pub notify_email: bool,
    pub notify_web: bool,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        NotificationPreference {
            reminder_minutes_before: None,
            notify_email: true,
            notify_web: true,
        }
    }
}

impl NotificationPreference {
    pub fn is_enabled(&self) -> bool {
        self.reminder_minutes_before.is_some() && (self.notify_email || self.notify_web)
    }
}

/// An in-app notification shown to the user on their next visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(user_id: UserId, title: &str, body: &str, now: DateTime<Utc>) -> Self {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        let user = User::new("Sam", "sam@example.com", "Mars/Olympus");
        assert_eq!(user.tz(), chrono_tz::UTC);
    }

    #[test]
    fn test_local_time_uses_user_zone() {
        let user = User::new("Sam", "sam@example.com", "Europe/Berlin");
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 16, 30, 0).unwrap();
        assert_eq!(user.local_time(at), "Mon Jun 3, 18:30 CEST");
    }

    #[test]
    fn test_preference_needs_lead_and_channel() {
        let mut pref = NotificationPreference::default();
        assert!(!pref.is_enabled());

        pref.reminder_minutes_before = Some(15);
        assert!(pref.is_enabled());

        pref.notify_email = false;
        pref.notify_web = false;
        assert!(!pref.is_enabled());
    }
}
