//! ICS feed generation.

use chrono::{DateTime, NaiveTime, Utc};
use icalendar::{Calendar, Component, EventLike, Property, ValueType};

use super::ALL_DAY_PROPERTY;
use crate::constants::PRODID;
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::Occurrence;
use crate::recurrence;

/// Generate a VCALENDAR holding one VEVENT per occurrence, in input order.
///
/// Output depends only on the occurrences: DTSTAMP comes from the record's
/// creation time. Templates keep their RRULE and EXDATEs; materialized instances
/// are written as plain events.
pub fn generate_feed(occurrences: &[Occurrence]) -> WeTimeResult<String> {
    let mut cal = Calendar::new();

    for occurrence in occurrences {
        let ics_event = build_vevent(occurrence)?;
        cal.push(ics_event);
    }

    let cal = cal.done();

    // Post-process to remove unnecessary bloat from the icalendar crate's output
    let output = strip_ics_bloat(&cal.to_string());

    Ok(output)
}

fn build_vevent(occurrence: &Occurrence) -> WeTimeResult<icalendar::Event> {
    if occurrence.end_utc < occurrence.start_utc {
        return Err(WeTimeError::Serialization(format!(
            "occurrence {} ends before it starts",
            occurrence.id
        )));
    }

    let (start, end, rule) = series_span(occurrence);

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&occurrence.export_uid());
    ics_event.summary(&occurrence.title);

    let dtstamp = occurrence
        .created_at
        .format("%Y%m%dT%H%M%SZ")
        .to_string();
    ics_event.add_property("DTSTAMP", &dtstamp);

    if occurrence.all_day && spans_whole_utc_days(start, end) {
        add_date_property(&mut ics_event, "DTSTART", start.date_naive());
        add_date_property(&mut ics_event, "DTEND", end.date_naive());
    } else {
        ics_event.add_property("DTSTART", start.format("%Y%m%dT%H%M%SZ").to_string());
        ics_event.add_property("DTEND", end.format("%Y%m%dT%H%M%SZ").to_string());
        // All-day in the owner's zone, so not expressible as DATE values
        if occurrence.all_day {
            ics_event.add_property(ALL_DAY_PROPERTY, "TRUE");
        }
    }

    if let Some(ref desc) = occurrence.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = occurrence.location {
        ics_event.location(loc);
    }

    if let Some(rule) = rule {
        for line in recurrence::rule_lines(&rule).filter(|l| !is_dtstart_line(l)) {
            ics_event.append_multi_property(rule_property(line));
        }
        for exdate in &occurrence.exception_dates {
            add_exdate_property(&mut ics_event, *exdate);
        }
    }

    Ok(ics_event.done())
}

/// Start, end and rule to write. A template whose rule still carries its own
/// DTSTART is written anchored at that instant, with the line removed.
fn series_span(occurrence: &Occurrence) -> (DateTime<Utc>, DateTime<Utc>, Option<String>) {
    let (start, end) = (occurrence.start_utc, occurrence.end_utc);

    let Some(stored) = occurrence.rule().filter(|_| !occurrence.is_recurrence_instance) else {
        return (start, end, None);
    };

    match recurrence::normalize(stored, start) {
        Ok(normalized) => (
            normalized.anchor,
            normalized.anchor + occurrence.duration(),
            Some(normalized.rule),
        ),
        Err(e) => {
            tracing::warn!(
                occurrence = %occurrence.id,
                error = %e,
                "Exporting unparseable rule unchanged"
            );
            (start, end, Some(stored.to_string()))
        }
    }
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

/// Both ends sit on UTC midnight, so DATE values keep the exact span.
fn spans_whole_utc_days(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let midnight = |t: DateTime<Utc>| t.time() == NaiveTime::MIN;
    end > start && midnight(start) && midnight(end)
}

fn is_dtstart_line(line: &str) -> bool {
    line.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("DTSTART"))
}

/// One stored rule line (`FREQ=...`, `RRULE:...`, `RDATE;VALUE=DATE:...`) as
/// its own property, parameters kept.
fn rule_property(line: &str) -> Property {
    let (name, value) = recurrence::split_rule_line(line);
    let mut parts = name.split(';');
    let key = parts.next().unwrap_or("RRULE").to_ascii_uppercase();

    let mut prop = Property::new(key, value);
    for param in parts {
        if let Some((k, v)) = param.split_once('=') {
            prop.add_parameter(k, v);
        }
    }
    prop
}

fn add_date_property(ics_event: &mut icalendar::Event, name: &str, date: chrono::NaiveDate) {
    let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
    prop.append_parameter(ValueType::Date);
    ics_event.append_property(prop);
}

/// EXDATE is a multi-property: one line per excluded date
fn add_exdate_property(ics_event: &mut icalendar::Event, date: chrono::NaiveDate) {
    let mut prop = Property::new("EXDATE", date.format("%Y%m%d").to_string());
    prop.append_parameter(ValueType::Date);
    ics_event.append_multi_property(prop);
}
