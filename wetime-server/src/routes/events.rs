//! Event endpoints

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use wetime_core::attendance::{self, AttendanceStatus};
use wetime_core::events::{self, NewOccurrence};
use wetime_core::query::query_window;
use wetime_core::visibility::visible_calendars;
use wetime_core::{
    Attendee, Calendar, CalendarId, CalendarKind, CoupleId, DateRange, EventSource, Occurrence, OccurrenceId,
    OccurrencePatch, UserId,
};

use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route(
            "/api/events/{id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/api/events/{id}/attend", post(attend_event))
        .route("/api/events/{id}/attendees", get(list_attendees))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowParams {
    pub range_start: Option<String>,
    pub range_end: Option<String>,
}

/// Calendar fields the client needs to draw an event
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    pub id: CalendarId,
    pub name: String,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: CalendarKind,
    pub owner_id: Option<UserId>,
    pub couple_id: Option<CoupleId>,
}

impl From<&Calendar> for CalendarSummary {
    fn from(calendar: &Calendar) -> Self {
        CalendarSummary {
            id: calendar.id,
            name: calendar.name.clone(),
            color: calendar.color.clone(),
            kind: calendar.kind,
            owner_id: calendar.owner_id(),
            couple_id: calendar.couple_id(),
        }
    }
}

#[derive(Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Occurrence,
    pub calendar: Option<CalendarSummary>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventView>,
}

#[derive(Serialize)]
pub struct EventResponse {
    pub event: Occurrence,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// GET /api/events?rangeStart=..&rangeEnd=.. - Visible occurrences in a window
async fn list_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<WindowParams>,
) -> Result<Json<EventsResponse>, AppError> {
    let window = DateRange::from_params(
        params.range_start.as_deref(),
        params.range_end.as_deref(),
        Utc::now(),
    )?;

    let calendars: HashMap<CalendarId, Calendar> = visible_calendars(state.store(), &user)
        .await?
        .into_iter()
        .map(|(calendar, _)| (calendar.id, calendar))
        .collect();

    let events = query_window(state.store(), &user, &window)
        .await?
        .into_iter()
        .map(|event| EventView {
            calendar: calendars.get(&event.calendar_id).map(CalendarSummary::from),
            event,
        })
        .collect();

    Ok(Json(EventsResponse { events }))
}

/// POST /api/events
async fn create_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewOccurrence>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let event = events::create_event(state.store(), &user, req, EventSource::Local).await?;
    Ok((StatusCode::CREATED, Json(EventResponse { event })))
}

/// GET /api/events/:id
async fn get_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OccurrenceId>,
) -> Result<Json<EventResponse>, AppError> {
    let event = events::get_event(state.store(), &user, id).await?;
    Ok(Json(EventResponse { event }))
}

/// PATCH /api/events/:id
async fn update_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OccurrenceId>,
    Json(patch): Json<OccurrencePatch>,
) -> Result<Json<EventResponse>, AppError> {
    let event = events::update_event(state.store(), &user, id, patch).await?;
    Ok(Json(EventResponse { event }))
}

/// DELETE /api/events/:id
async fn delete_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OccurrenceId>,
) -> Result<Json<OkResponse>, AppError> {
    events::delete_event(state.store(), &user, id).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
pub struct AttendRequest {
    pub status: AttendanceStatus,
}

#[derive(Serialize)]
pub struct AttendeeResponse {
    pub attendee: Attendee,
}

#[derive(Serialize)]
pub struct AttendeesResponse {
    pub attendees: Vec<Attendee>,
}

/// POST /api/events/:id/attend - Answer for yourself on a readable event
async fn attend_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OccurrenceId>,
    Json(req): Json<AttendRequest>,
) -> Result<Json<AttendeeResponse>, AppError> {
    let attendee =
        attendance::set_attendance(state.store(), &user, id, req.status, Utc::now()).await?;
    Ok(Json(AttendeeResponse { attendee }))
}

/// GET /api/events/:id/attendees
async fn list_attendees(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OccurrenceId>,
) -> Result<Json<AttendeesResponse>, AppError> {
    let attendees = attendance::attendees(state.store(), &user, id).await?;
    Ok(Json(AttendeesResponse { attendees }))
}
