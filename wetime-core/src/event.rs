//! Occurrence types.
//!
//! An [`Occurrence`] is the unit the engine works with: a stored event record,
//! or an instance materialized from a stored recurring template for one query.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::date_range::DateRange;

pub type UserId = Uuid;
pub type CoupleId = Uuid;
pub type CalendarId = Uuid;
pub type OccurrenceId = Uuid;

/// A single displayable time span, stored or materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub calendar_id: CalendarId,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub all_day: bool,

    // Recurrence
    /// RRULE text; a record carrying one is a template and is never displayed itself
    pub recurrence_rule: Option<String>,
    /// Calendar dates (UTC) removed from the expansion
    #[serde(default)]
    pub exception_dates: BTreeSet<NaiveDate>,
    /// True only for instances materialized by a window query
    #[serde(default)]
    pub is_recurrence_instance: bool,

    pub visibility: Visibility,
    /// Stable identifier from the source feed (UID)
    pub external_uid: Option<String>,
    pub source: EventSource,

    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Who the event is meant for within a couple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Owner,
    Partner,
}

/// How a stored record came to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Local,
    External,
    Imported,
}

impl Occurrence {
    pub fn new(
        calendar_id: CalendarId,
        title: impl Into<String>,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Self {
        Occurrence {
            id: Uuid::new_v4(),
            calendar_id,
            title: title.into(),
            description: None,
            location: None,
            start_utc,
            end_utc,
            all_day: false,
            recurrence_rule: None,
            exception_dates: BTreeSet::new(),
            is_recurrence_instance: false,
            visibility: Visibility::Owner,
            external_uid: None,
            source: EventSource::Local,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_utc - self.start_utc
    }

    /// The non-blank recurrence rule, if this record is a template.
    pub fn rule(&self) -> Option<&str> {
        self.recurrence_rule
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    pub fn is_template(&self) -> bool {
        self.rule().is_some()
    }

    pub fn overlaps(&self, window: &DateRange) -> bool {
        window.overlaps(self.start_utc, self.end_utc)
    }

    /// Materialize the instance of this template starting at `start`.
    /// The template's duration is preserved; everything else is copied.
    pub fn instance_at(&self, start: DateTime<Utc>) -> Occurrence {
        Occurrence {
            start_utc: start,
            end_utc: start + self.duration(),
            is_recurrence_instance: true,
            ..self.clone()
        }
    }

    /// UID written on export: the feed's UID when present, otherwise our id.
    pub fn export_uid(&self) -> String {
        match self.external_uid.as_deref() {
            Some(uid) if !uid.trim().is_empty() => uid.to_string(),
            _ => self.id.to_string(),
        }
    }

    pub fn apply(&mut self, patch: OccurrencePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(location) = patch.location {
            self.location = Some(location);
        }
        if let Some(start) = patch.start_utc {
            self.start_utc = start;
        }
        if let Some(end) = patch.end_utc {
            self.end_utc = end;
        }
        if let Some(all_day) = patch.all_day {
            self.all_day = all_day;
        }
        if let Some(rule) = patch.recurrence_rule {
            self.recurrence_rule = Some(rule).filter(|r| !r.trim().is_empty());
        }
        if let Some(exception_dates) = patch.exception_dates {
            self.exception_dates = exception_dates;
        }
        if let Some(visibility) = patch.visibility {
            self.visibility = visibility;
        }
    }
}

/// Field-wise update of a stored occurrence. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrencePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_utc: Option<DateTime<Utc>>,
    pub end_utc: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    /// An empty string clears the rule
    pub recurrence_rule: Option<String>,
    pub exception_dates: Option<BTreeSet<NaiveDate>>,
    pub visibility: Option<Visibility>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_test_occurrence() -> Occurrence {
        Occurrence::new(
            Uuid::new_v4(),
            "Standup",
            Utc.with_ymd_and_hms(2024, 5, 27, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 27, 9, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_instance_preserves_duration_and_fields() {
        let mut template = make_test_occurrence();
        template.recurrence_rule = Some("FREQ=WEEKLY;BYDAY=MO".to_string());
        template.location = Some("Kitchen".to_string());

        let start = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let instance = template.instance_at(start);

        assert_eq!(instance.id, template.id);
        assert_eq!(instance.start_utc, start);
        assert_eq!(instance.end_utc, start + Duration::minutes(30));
        assert!(instance.is_recurrence_instance);
        assert_eq!(instance.location.as_deref(), Some("Kitchen"));
        assert!(!template.is_recurrence_instance);
    }

    #[test]
    fn test_blank_rule_is_not_a_template() {
        let mut occ = make_test_occurrence();
        occ.recurrence_rule = Some("   ".to_string());
        assert!(!occ.is_template());

        occ.recurrence_rule = Some("FREQ=DAILY".to_string());
        assert!(occ.is_template());
    }

    #[test]
    fn test_export_uid_falls_back_to_id() {
        let mut occ = make_test_occurrence();
        assert_eq!(occ.export_uid(), occ.id.to_string());

        occ.external_uid = Some(String::new());
        assert_eq!(occ.export_uid(), occ.id.to_string());

        occ.external_uid = Some("abc123".to_string());
        assert_eq!(occ.export_uid(), "abc123");
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut occ = make_test_occurrence();
        occ.recurrence_rule = Some("FREQ=DAILY".to_string());

        occ.apply(OccurrencePatch {
            title: Some("Retro".to_string()),
            recurrence_rule: Some(String::new()),
            ..Default::default()
        });

        assert_eq!(occ.title, "Retro");
        assert_eq!(occ.recurrence_rule, None);
        assert_eq!(occ.duration(), Duration::minutes(30));
    }
}
