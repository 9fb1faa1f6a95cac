//! Event creation from chat assistant replies.
//!
//! The model is asked to answer with a JSON object when the user wants an event
//! created. This module finds that object and turns it into a stored event. The
//! HTTP client to the model and the prompt live outside this crate.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::calendar::CalendarKind;
use crate::constants::ASSISTANT_DEFAULT_DURATION_MINUTES;
use crate::date_range::parse_instant;
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, EventSource, Occurrence, Visibility};
use crate::events::{NewOccurrence, create_event};
use crate::store::Store;
use crate::user::User;
use crate::visibility::visible_calendars;

/// Event fields as the model wrote them. Times are unparsed strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "start")]
    pub starts_at: Option<String>,
    #[serde(alias = "end")]
    pub ends_at: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    pub calendar_id: Option<String>,
}

/// The first JSON object in `reply` that asks for an event: it has
/// `"action": "create_event"` or a title.
pub fn parse_event_creation(reply: &str) -> Option<EventDraft> {
    reply
        .match_indices('{')
        .filter_map(|(i, _)| {
            serde_json::Deserializer::from_str(&reply[i..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
        })
        .filter(|value| {
            value.get("action").and_then(Value::as_str) == Some("create_event")
                || value.get("title").and_then(Value::as_str).is_some()
        })
        .find_map(|value| serde_json::from_value(value).ok())
}

/// Pick the calendar for a draft: the named one if the user may write to it,
/// otherwise their first PERSONAL calendar, otherwise any writable one.
async fn target_calendar(
    store: &dyn Store,
    user: &User,
    requested: Option<&str>,
) -> WeTimeResult<CalendarId> {
    let writable: Vec<_> = visible_calendars(store, user)
        .await?
        .into_iter()
        .filter(|(_, access)| access.can_write())
        .map(|(calendar, _)| calendar)
        .collect();

    let requested = requested.and_then(|id| Uuid::parse_str(id.trim()).ok());
    if let Some(id) = requested
        && writable.iter().any(|c| c.id == id)
    {
        return Ok(id);
    }

    writable
        .iter()
        .find(|c| c.kind == CalendarKind::Personal)
        .or_else(|| writable.first())
        .map(|c| c.id)
        .ok_or_else(|| WeTimeError::NotFound("Writable calendar".to_string()))
}

async fn try_create(
    store: &dyn Store,
    user: &User,
    draft: &EventDraft,
    now: DateTime<Utc>,
) -> WeTimeResult<Occurrence> {
    let title = draft
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| WeTimeError::Invalid("draft has no title".to_string()))?;

    let calendar_id = target_calendar(store, user, draft.calendar_id.as_deref()).await?;

    let start_utc = match draft.starts_at.as_deref() {
        Some(s) => parse_instant(s)?,
        None => now,
    };
    let end_utc = match draft.ends_at.as_deref() {
        Some(s) => parse_instant(s)?,
        None => start_utc + Duration::minutes(ASSISTANT_DEFAULT_DURATION_MINUTES),
    };

    let new = NewOccurrence {
        calendar_id,
        title: title.to_string(),
        description: draft.description.clone(),
        location: draft.location.clone(),
        start_utc,
        end_utc,
        all_day: draft.all_day,
        recurrence_rule: None,
        exception_dates: Default::default(),
        visibility: Visibility::Owner,
    };

    create_event(store, user, new, EventSource::Local).await
}

/// Create the event a draft describes. Failures are logged and yield `None`;
/// the chat reply is still shown to the user.
pub async fn create_from_draft(
    store: &dyn Store,
    user: &User,
    draft: &EventDraft,
    now: DateTime<Utc>,
) -> Option<Occurrence> {
    match try_create(store, user, draft, now).await {
        Ok(occurrence) => {
            tracing::info!(user = %user.id, occurrence = %occurrence.id, "Assistant created event");
            Some(occurrence)
        }
        Err(e) => {
            tracing::warn!(user = %user.id, error = %e, "Assistant event not created");
            None
        }
    }
}
