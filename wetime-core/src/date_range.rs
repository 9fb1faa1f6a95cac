//! Half-open query windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WINDOW_FUTURE_DAYS, DEFAULT_WINDOW_PAST_DAYS};
use crate::error::{WeTimeError, WeTimeResult};

/// A half-open window `[start, end)` over absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> WeTimeResult<Self> {
        if end <= start {
            return Err(WeTimeError::InvalidWindow(format!(
                "end {} is not after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Default window around `now`: 7 days back, 30 days ahead.
    pub fn around(now: DateTime<Utc>) -> Self {
        DateRange {
            start: now - Duration::days(DEFAULT_WINDOW_PAST_DAYS),
            end: now + Duration::days(DEFAULT_WINDOW_FUTURE_DAYS),
        }
    }

    /// Build a window from the `rangeStart`/`rangeEnd` request parameters.
    /// Missing bounds fall back to the defaults of [`DateRange::around`].
    pub fn from_params(
        range_start: Option<&str>,
        range_end: Option<&str>,
        now: DateTime<Utc>,
    ) -> WeTimeResult<Self> {
        let defaults = Self::around(now);

        let start = match range_start {
            Some(s) => parse_instant(s)?,
            None => defaults.start,
        };

        let end = match range_end {
            Some(s) => parse_instant(s)?,
            None => defaults.end,
        };

        Self::new(start, end)
    }

    /// Half-open overlap test: `start < self.end && end > self.start`.
    /// Spans that merely touch a boundary do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }

    /// Whether `t` lies in `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Parse an ISO-8601 instant. A bare `YYYY-MM-DD` means midnight UTC.
pub(crate) fn parse_instant(s: &str) -> WeTimeResult<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| WeTimeError::InvalidWindow(format!("'{}' is not an ISO-8601 instant", s)))
}
