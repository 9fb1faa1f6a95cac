//! Core engine for WeTime, a calendar shared between two partners.
//!
//! - `recurrence` and `query` turn stored occurrences into concrete instances
//!   for a time window
//! - `ics` reads and writes iCalendar feeds
//! - `visibility` decides which calendars a user sees and may write
//! - `sync` pulls external feeds into the store, `dedup` cleans up after it
//! - `store` is the persistence boundary, with an in-memory implementation

pub mod admin;
pub mod assistant;
pub mod attendance;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod couple;
pub mod date_range;
pub mod dedup;
pub mod error;
pub mod event;
pub mod events;
pub mod exchange;
pub mod ics;
pub mod query;
pub mod recurrence;
pub mod reminders;
pub mod store;
pub mod sync;
pub mod user;
pub mod visibility;

pub use attendance::{AttendanceStatus, Attendee};
pub use calendar::{Calendar, CalendarKind, CalendarOwner, FeedState};
pub use config::WeTimeConfig;
pub use date_range::DateRange;
pub use error::{WeTimeError, WeTimeResult};
pub use event::*;
pub use store::{MemoryStore, Store};
pub use user::{Couple, Notification, NotificationPreference, User};
pub use visibility::Access;
