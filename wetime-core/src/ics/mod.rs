//! ICS feed parsing and generation.
//!
//! Reads external feed text into normalized [`ParsedOccurrence`] records and writes
//! stored occurrences back out as an RFC 5545 calendar. Pure text transformation:
//! fetching and persisting live elsewhere.

mod generate;
mod parse;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{CalendarId, EventSource, Occurrence, UserId, Visibility};

pub use generate::generate_feed;
pub use parse::parse_feed;

/// Marks an all-day event written with date-time values (Outlook's convention).
const ALL_DAY_PROPERTY: &str = "X-MICROSOFT-CDO-ALLDAYEVENT";

/// One VEVENT normalized to UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedOccurrence {
    pub external_uid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub all_day: bool,
    pub recurrence_rule: Option<String>,
    pub exception_dates: BTreeSet<NaiveDate>,
}

impl ParsedOccurrence {
    /// A fresh stored record in `calendar_id` carrying this entry's content.
    pub fn into_occurrence(
        self,
        calendar_id: CalendarId,
        source: EventSource,
        created_by: Option<UserId>,
    ) -> Occurrence {
        Occurrence {
            id: Uuid::new_v4(),
            calendar_id,
            title: self.title,
            description: self.description,
            location: self.location,
            start_utc: self.start_utc,
            end_utc: self.end_utc,
            all_day: self.all_day,
            recurrence_rule: self.recurrence_rule,
            exception_dates: self.exception_dates,
            is_recurrence_instance: false,
            visibility: Visibility::Owner,
            external_uid: self.external_uid,
            source,
            created_by,
            created_at: Utc::now(),
        }
    }

    /// Overwrite the feed-owned fields of an existing record.
    /// Identity, calendar, visibility and creation metadata are kept.
    pub fn apply_to(&self, occurrence: &mut Occurrence) {
        occurrence.title = self.title.clone();
        occurrence.description = self.description.clone();
        occurrence.location = self.location.clone();
        occurrence.start_utc = self.start_utc;
        occurrence.end_utc = self.end_utc;
        occurrence.all_day = self.all_day;
        occurrence.recurrence_rule = self.recurrence_rule.clone();
        occurrence.exception_dates = self.exception_dates.clone();
    }
}
