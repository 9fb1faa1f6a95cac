//! Storage collaborator.
//!
//! The engine reads and writes through [`Store`]. Every method is one atomic
//! operation against the backing storage; overlapping writers get
//! last-write-wins and nothing stronger.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::attendance::Attendee;
use crate::calendar::Calendar;
use crate::date_range::DateRange;
use crate::error::WeTimeResult;
use crate::event::{CalendarId, CoupleId, Occurrence, OccurrenceId, UserId};
use crate::reminders::ReminderKey;
use crate::user::{Couple, Notification, NotificationPreference, User};

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn user(&self, id: UserId) -> WeTimeResult<Option<User>>;
    /// Every user, in creation order.
    async fn users(&self) -> WeTimeResult<Vec<User>>;
    async fn save_user(&self, user: User) -> WeTimeResult<()>;

    // Couples
    async fn couple(&self, id: CoupleId) -> WeTimeResult<Option<Couple>>;
    async fn couples(&self) -> WeTimeResult<Vec<Couple>>;
    async fn couple_by_code(&self, code: &str) -> WeTimeResult<Option<Couple>>;
    async fn couple_members(&self, id: CoupleId) -> WeTimeResult<Vec<User>>;

    /// Store the couple and its shared calendar and link `creator`, all at once.
    async fn create_couple(
        &self,
        couple: Couple,
        shared: Calendar,
        creator: UserId,
    ) -> WeTimeResult<()>;

    /// Link `user` to `couple`. Fails with a couple conflict when the couple
    /// already has two members or the user already belongs to a couple.
    async fn join_couple(&self, couple: CoupleId, user: UserId) -> WeTimeResult<()>;

    // Calendars
    async fn calendar(&self, id: CalendarId) -> WeTimeResult<Option<Calendar>>;

    /// Every calendar, in creation order.
    async fn calendars(&self) -> WeTimeResult<Vec<Calendar>>;

    /// Calendars owned by `user`, in creation order.
    async fn calendars_owned_by(&self, user: UserId) -> WeTimeResult<Vec<Calendar>>;

    async fn shared_calendar(&self, couple: CoupleId) -> WeTimeResult<Option<Calendar>>;

    /// EXTERNAL calendars of every user.
    async fn external_calendars(&self) -> WeTimeResult<Vec<Calendar>>;

    async fn save_calendar(&self, calendar: Calendar) -> WeTimeResult<()>;

    /// Delete a calendar together with its occurrences. Returns whether it existed.
    async fn delete_calendar(&self, id: CalendarId) -> WeTimeResult<bool>;

    // Occurrences
    async fn occurrence(&self, id: OccurrenceId) -> WeTimeResult<Option<Occurrence>>;

    /// Stored occurrences in `calendar_ids` that overlap `window` (half-open),
    /// plus every template there that starts before `window.end`.
    /// Returned in insertion order.
    async fn occurrences_for_window(
        &self,
        calendar_ids: &[CalendarId],
        window: &DateRange,
    ) -> WeTimeResult<Vec<Occurrence>>;

    async fn occurrences_in_calendar(&self, calendar: CalendarId)
    -> WeTimeResult<Vec<Occurrence>>;

    async fn all_occurrences(&self) -> WeTimeResult<Vec<Occurrence>>;

    async fn find_by_external_uid(
        &self,
        calendar: CalendarId,
        uid: &str,
    ) -> WeTimeResult<Option<Occurrence>>;

    /// Insert, or replace the record with the same id.
    async fn save_occurrence(&self, occurrence: Occurrence) -> WeTimeResult<()>;

    /// [`Store::save_occurrence`] for many records as one write: all of them
    /// are stored or none are.
    async fn save_occurrences(&self, occurrences: Vec<Occurrence>) -> WeTimeResult<()>;

    /// Returns how many of `ids` were present. Their attendance goes with them.
    async fn delete_occurrences(&self, ids: &[OccurrenceId]) -> WeTimeResult<usize>;

    // Attendance
    /// Insert, or replace the entry for the same (event, user).
    async fn save_attendee(&self, attendee: Attendee) -> WeTimeResult<()>;

    async fn attendees_for(&self, event: OccurrenceId) -> WeTimeResult<Vec<Attendee>>;

    // Reminders and notifications
    async fn notification_preferences(
        &self,
    ) -> WeTimeResult<Vec<(UserId, NotificationPreference)>>;

    async fn notification_preference(&self, user: UserId) -> WeTimeResult<NotificationPreference>;

    async fn save_notification_preference(
        &self,
        user: UserId,
        preference: NotificationPreference,
    ) -> WeTimeResult<()>;

    /// Record that a reminder went out. Returns false if it was already recorded.
    async fn mark_reminder_sent(&self, key: ReminderKey) -> WeTimeResult<bool>;

    /// Forget sent-markers for instances starting at or before `before`.
    /// Returns how many were dropped.
    async fn prune_reminders_sent(&self, before: DateTime<Utc>) -> WeTimeResult<usize>;

    async fn add_notification(&self, notification: Notification) -> WeTimeResult<()>;

    /// Newest first.
    async fn notifications_for(&self, user: UserId) -> WeTimeResult<Vec<Notification>>;

    /// Set the read flag of one of `user`'s notifications. Returns false when
    /// the user has no such notification.
    async fn set_notification_read(&self, user: UserId, id: Uuid, read: bool)
    -> WeTimeResult<bool>;
}
