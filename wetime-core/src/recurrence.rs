//! RRULE expansion for recurring occurrences.
//!
//! Expands a template's recurrence rule into the start instants that fall in a
//! query window, dropping any instant whose UTC calendar date is an exception.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rrule::{RRuleSet, Tz};

use crate::constants::MAX_INSTANCES_PER_WINDOW;
use crate::date_range::DateRange;
use crate::error::{WeTimeError, WeTimeResult};

/// Build an iCalendar-format rule set string for the rrule crate parser.
///
/// Stored rules come in two shapes: a bare `FREQ=...` value (optionally with an
/// `RRULE:` prefix), anchored at the template's start, or a full block that
/// already carries its own `DTSTART` line.
fn build_rrule_string(rule: &str, dtstart: DateTime<Utc>) -> String {
    let lines: Vec<&str> = rule_lines(rule).collect();

    let has_dtstart = lines.iter().any(|l| has_name(l, "DTSTART"));

    let mut out = Vec::with_capacity(lines.len() + 1);
    if !has_dtstart {
        out.push(format!("DTSTART:{}", dtstart.format("%Y%m%dT%H%M%SZ")));
    }

    for line in lines {
        if is_named_line(line) {
            out.push(line.to_string());
        } else {
            out.push(format!("RRULE:{}", line));
        }
    }

    out.join("\n")
}

/// Non-blank lines of a stored rule, trimmed.
pub fn rule_lines(rule: &str) -> impl Iterator<Item = &str> {
    rule.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Whether the line starts with property `name` followed by `:` or `;`.
fn has_name(line: &str, name: &str) -> bool {
    line.len() > name.len()
        && line.is_char_boundary(name.len())
        && line[..name.len()].eq_ignore_ascii_case(name)
        && matches!(line.as_bytes()[name.len()], b':' | b';')
}

/// Whether the line already starts with a property name (`RRULE:`, `EXDATE;...`).
fn is_named_line(line: &str) -> bool {
    ["DTSTART", "RRULE", "EXRULE", "EXDATE", "RDATE"]
        .iter()
        .any(|name| has_name(line, name))
}

/// Split a named line into its name (parameters included) and value.
/// A bare `FREQ=...` line is read as an RRULE value.
pub fn split_rule_line(line: &str) -> (&str, &str) {
    if !is_named_line(line) {
        return ("RRULE", line);
    }
    line.split_once(':').unwrap_or((line, ""))
}

/// A rule in the form stored on a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRule {
    /// A lone RRULE value, or named lines when the set has more than one
    pub rule: String,
    /// Start of the series: the rule's own DTSTART, else the record's start
    pub anchor: DateTime<Utc>,
}

/// Check `rule` and rewrite it for storage. An embedded DTSTART line is
/// removed and returned as the anchor, so the stored text never carries one.
pub fn normalize(rule: &str, dtstart: DateTime<Utc>) -> WeTimeResult<NormalizedRule> {
    let rrule_set = parse_rule_set(rule, dtstart)?;
    let anchor = rrule_set.get_dt_start().with_timezone(&Utc);

    let lines: Vec<&str> = rule_lines(rule)
        .filter(|l| !has_name(l, "DTSTART"))
        .collect();

    let rule = match lines.as_slice() {
        [only] if split_rule_line(only).0.eq_ignore_ascii_case("RRULE") => {
            split_rule_line(only).1.to_string()
        }
        _ => lines
            .iter()
            .map(|l| {
                if is_named_line(l) {
                    l.to_string()
                } else {
                    format!("RRULE:{}", l)
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    Ok(NormalizedRule { rule, anchor })
}

/// Check that `rule` parses, anchored at `dtstart`.
pub fn validate(rule: &str, dtstart: DateTime<Utc>) -> WeTimeResult<()> {
    parse_rule_set(rule, dtstart).map(|_| ())
}

fn parse_rule_set(rule: &str, dtstart: DateTime<Utc>) -> WeTimeResult<RRuleSet> {
    build_rrule_string(rule, dtstart)
        .parse()
        .map_err(|e| WeTimeError::InvalidRule {
            rule: rule.to_string(),
            reason: format!("{}", e),
        })
}

/// Expand `rule` into every start instant `t` with `window.start <= t < window.end`,
/// ascending, skipping instants whose UTC date is in `exceptions`.
///
/// `dtstart` anchors rules that do not carry their own DTSTART. Unbounded rules
/// are fine: the window bounds the expansion.
pub fn expand(
    rule: &str,
    dtstart: DateTime<Utc>,
    exceptions: &BTreeSet<NaiveDate>,
    window: &DateRange,
) -> WeTimeResult<Vec<DateTime<Utc>>> {
    let rrule_set = parse_rule_set(rule, dtstart)?;

    // Widen by a second on each side so the crate's own bound semantics
    // never matter; the exact half-open filter is applied below.
    let after = (window.start - Duration::seconds(1)).with_timezone(&Tz::UTC);
    let before = (window.end + Duration::seconds(1)).with_timezone(&Tz::UTC);

    let result = rrule_set
        .after(after)
        .before(before)
        .all(MAX_INSTANCES_PER_WINDOW);

    if result.limited {
        tracing::warn!(
            rule = %rule,
            limit = MAX_INSTANCES_PER_WINDOW,
            "Recurrence expansion hit the per-window instance limit"
        );
    }

    let mut starts: Vec<DateTime<Utc>> = result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|t| window.contains(*t))
        .filter(|t| !exceptions.contains(&t.date_naive()))
        .collect();

    starts.sort();
    starts.dedup();

    tracing::trace!(rule = %rule, count = starts.len(), "Expanded recurrence");

    Ok(starts)
}
