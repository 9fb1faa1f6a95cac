//! ICS feed parsing using the icalendar crate's parser.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use super::{ALL_DAY_PROPERTY, ParsedOccurrence};
use crate::constants::UNTITLED;
use crate::error::{WeTimeError, WeTimeResult};

/// Parse feed text into one record per well-formed VEVENT.
///
/// Blocks that cannot be read (missing or unparseable DTSTART, end before start,
/// syntax errors) are skipped with a warning. Text that is not a calendar at all
/// is a [`WeTimeError::FeedParse`].
pub fn parse_feed(content: &str) -> WeTimeResult<Vec<ParsedOccurrence>> {
    let unfolded = unfold(content);

    let is_calendar = unfolded
        .lines()
        .any(|l| l.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"));
    if !is_calendar {
        return Err(WeTimeError::FeedParse(
            "no VCALENDAR component in feed".to_string(),
        ));
    }

    let blocks = split_vevents(&unfolded);
    let mut parsed = Vec::with_capacity(blocks.len());

    for (index, block) in blocks.iter().enumerate() {
        // Each VEVENT is read on its own so one broken block cannot poison the rest
        let wrapped = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//feed//EN\r\n{}END:VCALENDAR\r\n",
            block
        );

        let calendar = match read_calendar(&wrapped) {
            Ok(calendar) => calendar,
            Err(e) => {
                tracing::warn!(block = index, error = %e, "Skipping unreadable VEVENT");
                continue;
            }
        };

        let Some(vevent) = calendar.components.iter().find(|c| c.name == "VEVENT") else {
            continue;
        };

        match parse_vevent(vevent) {
            Ok(occurrence) => parsed.push(occurrence),
            Err(reason) => {
                tracing::warn!(block = index, %reason, "Skipping malformed VEVENT");
            }
        }
    }

    tracing::debug!(
        blocks = blocks.len(),
        parsed = parsed.len(),
        "Parsed ICS feed"
    );

    Ok(parsed)
}

/// Collect the raw text of every top-level VEVENT, BEGIN and END lines included.
fn split_vevents(unfolded: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in unfolded.lines() {
        let trimmed = line.trim_end();

        if trimmed.eq_ignore_ascii_case("BEGIN:VEVENT") {
            // An unterminated previous block is dropped
            current = Some(String::new());
        }

        if let Some(block) = current.as_mut() {
            block.push_str(trimmed);
            block.push_str("\r\n");
        }

        if trimmed.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
        }
    }

    blocks
}

fn parse_vevent(vevent: &Component) -> Result<ParsedOccurrence, String> {
    let external_uid = text_prop(vevent, "UID");

    let title = text_prop(vevent, "SUMMARY").unwrap_or_else(|| UNTITLED.to_string());

    let dtstart = vevent.find_prop("DTSTART").ok_or("missing DTSTART")?;
    let (start_utc, all_day) = to_utc(dtstart)?;

    let end_utc = match vevent.find_prop("DTEND") {
        Some(dtend) => to_utc(dtend)?.0,
        None => match vevent.find_prop("DURATION") {
            Some(duration) => start_utc + parse_duration(duration.val.as_ref())?,
            // RFC 5545 3.6.1: a date start alone spans the day, a datetime start is instantaneous
            None if all_day => start_utc + Duration::days(1),
            None => start_utc,
        },
    };

    if end_utc < start_utc {
        return Err(format!(
            "end {} before start {}",
            end_utc.to_rfc3339(),
            start_utc.to_rfc3339()
        ));
    }

    let all_day = all_day
        || vevent
            .find_prop(ALL_DAY_PROPERTY)
            .is_some_and(|p| p.val.as_ref().trim().eq_ignore_ascii_case("TRUE"));

    let recurrence_rule = recurrence_rule(vevent);

    let exception_dates: BTreeSet<NaiveDate> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    Ok(ParsedOccurrence {
        external_uid,
        title,
        description: text_prop(vevent, "DESCRIPTION"),
        location: text_prop(vevent, "LOCATION"),
        start_utc,
        end_utc,
        all_day,
        recurrence_rule,
        exception_dates,
    })
}

/// The event's recurrence set. A lone RRULE is kept as its bare value; several
/// RRULE, RDATE or EXRULE properties become one named line each.
fn recurrence_rule(vevent: &Component) -> Option<String> {
    let props: Vec<&Property> = vevent
        .properties
        .iter()
        .filter(|p| matches!(p.name.as_ref(), "RRULE" | "RDATE" | "EXRULE"))
        .filter(|p| !p.val.as_ref().trim().is_empty())
        .collect();

    match props.as_slice() {
        [] => None,
        [only] if only.name == "RRULE" => Some(only.val.as_ref().trim().to_string()),
        _ => Some(
            props
                .iter()
                .map(|p| {
                    let params: String = p
                        .params
                        .iter()
                        .map(|param| match &param.val {
                            Some(val) => format!(";{}={}", param.key, val),
                            None => format!(";{}", param.key),
                        })
                        .collect();
                    format!("{}{}:{}", p.name, params, p.val.as_ref().trim())
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
    }
}

/// Non-blank TEXT property value with RFC 5545 escapes resolved.
fn text_prop(vevent: &Component, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|v| !v.trim().is_empty())
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

/// Resolve a DTSTART/DTEND property to an absolute instant.
/// Returns whether the value was a bare date.
fn to_utc(prop: &Property) -> Result<(DateTime<Utc>, bool), String> {
    let dpt = DatePerhapsTime::try_from(prop)
        .map_err(|_| format!("unparseable {} '{}'", prop.name, prop.val))?;

    Ok(match dpt {
        DatePerhapsTime::Date(d) => (date_to_utc(d), true),
        DatePerhapsTime::DateTime(cal_dt) => (calendar_datetime_to_utc(cal_dt), false),
    })
}

fn date_to_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn calendar_datetime_to_utc(cal_dt: CalendarDateTime) -> DateTime<Utc> {
    match cal_dt {
        CalendarDateTime::Utc(dt) => dt,
        // Floating times carry no zone; UTC keeps the result independent of the host
        CalendarDateTime::Floating(naive) => naive.and_utc(),
        CalendarDateTime::WithTimezone { date_time, tzid } => zoned_to_utc(date_time, &tzid),
    }
}

/// Interpret `naive` as wall-clock time in `tzid`.
///
/// Unknown zone names fall back to UTC. Ambiguous times (DST fall-back) take the
/// earlier instant; nonexistent times (DST gap) are read one hour later.
fn zoned_to_utc(naive: NaiveDateTime, tzid: &str) -> DateTime<Utc> {
    let Ok(tz) = tzid.trim_matches('"').parse::<chrono_tz::Tz>() else {
        tracing::debug!(tzid, "Unknown TZID, reading time as UTC");
        return naive.and_utc();
    };

    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// Parse a DURATION value (`PT1H30M`, `P1D`) into a chrono duration.
fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.starts_with('-') {
        return Err(format!("negative DURATION '{}'", trimmed));
    }

    let duration = iso8601::duration(trimmed.trim_start_matches('+'))
        .map_err(|e| format!("unparseable DURATION '{}': {}", trimmed, e))?;
    let std_duration: std::time::Duration = duration.into();

    Duration::from_std(std_duration).map_err(|e| format!("DURATION out of range: {}", e))
}

/// Parse an EXDATE property into UTC calendar dates.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values
fn parse_exdate_property(prop: &Property) -> Vec<NaiveDate> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok()
            } else if let Some(stripped) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| dt.date())
            } else {
                let naive = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
                Some(match tzid {
                    Some(ref tz) => zoned_to_utc(naive, tz).date_naive(),
                    None => naive.date(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn wrap(body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{}END:VCALENDAR\r\n",
            body
        )
    }

    #[test]
    fn test_parse_basic_event() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:abc-1\r\n\
SUMMARY:Dinner\r\n\
DESCRIPTION:Table for two\r\n\
LOCATION:Luigi's\r\n\
DTSTART:20240601T180000Z\r\n\
DTEND:20240601T200000Z\r\n\
END:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics).unwrap();
        assert_eq!(parsed.len(), 1);

        let event = &parsed[0];
        assert_eq!(event.external_uid.as_deref(), Some("abc-1"));
        assert_eq!(event.title, "Dinner");
        assert_eq!(event.description.as_deref(), Some("Table for two"));
        assert_eq!(event.location.as_deref(), Some("Luigi's"));
        assert_eq!(event.start_utc, at(2024, 6, 1, 18, 0));
        assert_eq!(event.end_utc, at(2024, 6, 1, 20, 0));
        assert!(!event.all_day);
        assert_eq!(event.recurrence_rule, None);
    }

    #[test]
    fn test_missing_summary_becomes_untitled() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:no-title\r\n\
DTSTART:20240601T180000Z\r\n\
DTEND:20240601T190000Z\r\n\
END:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics).unwrap();
        assert_eq!(parsed[0].title, UNTITLED);
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:good\r\n\
SUMMARY:Good\r\n\
DTSTART:20240601T180000Z\r\n\
DTEND:20240601T190000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:no-start\r\n\
SUMMARY:Broken\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:backwards\r\n\
SUMMARY:Backwards\r\n\
DTSTART:20240601T180000Z\r\n\
DTEND:20240601T170000Z\r\n\
END:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].external_uid.as_deref(), Some("good"));
    }

    #[test]
    fn test_non_calendar_text_is_rejected() {
        let err = parse_feed("<html>Not found</html>").unwrap_err();
        assert!(matches!(err, WeTimeError::FeedParse(_)));
    }

    #[test]
    fn test_empty_calendar_parses_to_nothing() {
        let parsed = parse_feed(&wrap("")).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_all_day_event_without_end_spans_one_day() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:holiday\r\n\
SUMMARY:Holiday\r\n\
DTSTART;VALUE=DATE:20240704\r\n\
END:VEVENT\r\n",
        );

        let event = &parse_feed(&ics).unwrap()[0];
        assert!(event.all_day);
        assert_eq!(event.start_utc, at(2024, 7, 4, 0, 0));
        assert_eq!(event.end_utc, at(2024, 7, 5, 0, 0));
    }

    #[test]
    fn test_duration_used_when_dtend_missing() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:dur\r\n\
SUMMARY:Call\r\n\
DTSTART:20240601T090000Z\r\n\
DURATION:PT1H30M\r\n\
END:VEVENT\r\n",
        );

        let event = &parse_feed(&ics).unwrap()[0];
        assert_eq!(event.end_utc, at(2024, 6, 1, 10, 30));
    }

    #[test]
    fn test_tzid_is_resolved_to_utc() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:zoned\r\n\
SUMMARY:Zoned\r\n\
DTSTART;TZID=Europe/Berlin:20240601T100000\r\n\
DTEND;TZID=Europe/Berlin:20240601T110000\r\n\
END:VEVENT\r\n",
        );

        let event = &parse_feed(&ics).unwrap()[0];
        // CEST is UTC+2
        assert_eq!(event.start_utc, at(2024, 6, 1, 8, 0));
        assert_eq!(event.end_utc, at(2024, 6, 1, 9, 0));
    }

    #[test]
    fn test_recurrence_and_exdates_are_normalized_to_dates() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:weekly\r\n\
SUMMARY:Recurring Event\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
EXDATE;TZID=America/New_York:20240108T100000,20240115T100000\r\n\
EXDATE;VALUE=DATE:20240122\r\n\
EXDATE:20240129T100000Z\r\n\
END:VEVENT\r\n",
        );

        let event = &parse_feed(&ics).unwrap()[0];
        assert_eq!(
            event.recurrence_rule.as_deref(),
            Some("FREQ=WEEKLY;BYDAY=MO")
        );

        let expected: BTreeSet<NaiveDate> = [
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 22).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 29).unwrap(),
        ]
        .into();
        assert_eq!(event.exception_dates, expected);
    }

    #[test]
    fn test_line_folding_preserves_whitespace() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:folded\r\n\
SUMMARY:Test\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
DESCRIPTION:Hello \r\n world and \r\n more text\r\n\
END:VEVENT\r\n",
        );

        let event = &parse_feed(&ics).unwrap()[0];
        assert_eq!(
            event.description.as_deref(),
            Some("Hello world and more text")
        );
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text(r"a\, b\; c\\d\ne"), "a, b; c\\d\ne");
        assert_eq!(unescape_text("plain"), "plain");
    }

    #[test]
    fn test_vtimezone_and_valarm_do_not_confuse_blocks() {
        let ics = wrap(
            "BEGIN:VTIMEZONE\r\n\
TZID:Europe/Berlin\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:with-alarm\r\n\
SUMMARY:Alarmed\r\n\
DTSTART:20240601T180000Z\r\n\
DTEND:20240601T190000Z\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
TRIGGER:-PT15M\r\n\
END:VALARM\r\n\
END:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Alarmed");
    }

    #[test]
    fn test_outlook_all_day_flag_and_extra_rule_lines() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:holiday\r\n\
SUMMARY:Holiday\r\n\
DTSTART:20240704T040000Z\r\n\
DTEND:20240705T040000Z\r\n\
X-MICROSOFT-CDO-ALLDAYEVENT:TRUE\r\n\
RRULE:FREQ=YEARLY\r\n\
RDATE;VALUE=DATE:20240801\r\n\
END:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics).unwrap();
        assert!(parsed[0].all_day);
        assert_eq!(parsed[0].start_utc, at(2024, 7, 4, 4, 0));
        assert_eq!(
            parsed[0].recurrence_rule.as_deref(),
            Some("RRULE:FREQ=YEARLY\nRDATE;VALUE=DATE:20240801")
        );
    }
}
