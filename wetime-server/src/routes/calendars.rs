//! Calendar endpoints: listing, management, import/export and feed refresh

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use wetime_core::calendar::{
    CalendarPatch, NewCalendar, create_calendar, delete_calendar, list_calendars, update_calendar,
};
use wetime_core::exchange::{ImportSummary, export_calendar, import_feed};
use wetime_core::sync::{SyncOutcome, refresh_calendar};
use wetime_core::{Access, Calendar, CalendarId};

use crate::routes::events::OkResponse;
use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/calendars", get(list).post(create))
        .route("/api/calendars/import", post(import))
        .route("/api/calendars/{id}", patch(update).delete(delete))
        .route("/api/calendars/{id}/export.ics", get(export))
        .route("/api/calendars/{id}/refresh", post(refresh))
}

/// Calendar info returned by API
#[derive(Serialize)]
pub struct CalendarInfo {
    #[serde(flatten)]
    pub calendar: Calendar,
    pub access: Access,
    pub writable: bool,
}

#[derive(Serialize)]
pub struct CalendarsResponse {
    pub calendars: Vec<CalendarInfo>,
}

#[derive(Serialize)]
pub struct CalendarResponse {
    pub calendar: Calendar,
}

/// JSON form of an import request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[serde(default)]
    pub ics_text: String,
}

/// GET /api/calendars - Visible calendars in creation order
async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CalendarsResponse>, AppError> {
    let calendars = list_calendars(state.store(), &user)
        .await?
        .into_iter()
        .map(|(calendar, access)| CalendarInfo {
            calendar,
            access,
            writable: access.can_write(),
        })
        .collect();

    Ok(Json(CalendarsResponse { calendars }))
}

/// POST /api/calendars
async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewCalendar>,
) -> Result<(StatusCode, Json<CalendarResponse>), AppError> {
    let calendar = create_calendar(state.store(), &user, req).await?;
    Ok((StatusCode::CREATED, Json(CalendarResponse { calendar })))
}

/// PATCH /api/calendars/:id - Rename or recolor
async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CalendarId>,
    Json(req): Json<CalendarPatch>,
) -> Result<Json<CalendarResponse>, AppError> {
    let calendar = update_calendar(state.store(), &user, id, req).await?;
    Ok(Json(CalendarResponse { calendar }))
}

/// DELETE /api/calendars/:id
async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CalendarId>,
) -> Result<Json<OkResponse>, AppError> {
    delete_calendar(state.store(), &user, id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// POST /api/calendars/import - Body is raw ICS text or `{ "icsText": ... }`
async fn import(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportSummary>), AppError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let text = if is_json {
        serde_json::from_slice::<ImportRequest>(&body)
            .map(|req| req.ics_text)
            .unwrap_or_default()
    } else {
        String::from_utf8_lossy(&body).into_owned()
    };

    let summary = import_feed(state.store(), &user, &text).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/calendars/:id/export.ics
async fn export(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CalendarId>,
) -> Result<impl IntoResponse, AppError> {
    let (calendar, feed) = export_calendar(state.store(), &user, id).await?;

    let disposition = format!("attachment; filename=\"calendar-{}.ics\"", calendar.id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        feed,
    ))
}

/// POST /api/calendars/:id/refresh - Owner-triggered feed refresh
async fn refresh(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CalendarId>,
) -> Result<Json<SyncOutcome>, AppError> {
    let outcome = refresh_calendar(state.store(), state.fetcher.as_ref(), &user, id).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:abc123\r\n\
SUMMARY:Dentist\r\n\
DTSTART:20240605T140000Z\r\n\
DTEND:20240605T150000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[tokio::test]
    async fn test_create_list_rename_delete() {
        let state = test_state(None);
        let alex = add_user(&state, "Alex").await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/calendars",
            Some(&alex),
            Some(json!({"type": "PERSONAL", "name": "Work", "color": "#ff0000"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["calendar"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&state, "GET", "/api/calendars", Some(&alex), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calendars"][0]["name"], "Work");
        assert_eq!(body["calendars"][0]["access"], "owner");
        assert_eq!(body["calendars"][0]["writable"], true);

        let uri = format!("/api/calendars/{}", id);
        let (status, body) =
            send(&state, "PATCH", &uri, Some(&alex), Some(json!({"name": "Job"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calendar"]["name"], "Job");

        let (status, _) = send(&state, "DELETE", &uri, Some(&alex), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&state, "GET", "/api/calendars", Some(&alex), None).await;
        assert!(body["calendars"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_then_export() {
        let state = test_state(None);
        let alex = add_user(&state, "Alex").await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/calendars/import",
            Some(&alex),
            Some(json!({"icsText": FEED})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["imported"], 1);
        let calendar_id = body["calendarId"].as_str().unwrap().to_string();

        let (status, body) = send(
            &state,
            "POST",
            "/api/calendars/import",
            Some(&alex),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid_ics"));

        let request = Request::builder()
            .uri(format!("/api/calendars/{}/export.ics", calendar_id))
            .header(crate::routes::USER_ID_HEADER, alex.id.to_string())
            .body(Body::empty())
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/calendar; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"calendar-{}.ics\"", calendar_id).as_str()
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("UID:abc123"));
        assert!(text.contains("SUMMARY:Dentist"));
    }

    #[tokio::test]
    async fn test_raw_ics_body_is_accepted() {
        let state = test_state(None);
        let alex = add_user(&state, "Alex").await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/calendars/import")
            .header(crate::routes::USER_ID_HEADER, alex.id.to_string())
            .header(header::CONTENT_TYPE, "text/calendar")
            .body(Body::from(FEED))
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_refresh_permissions_and_failures() {
        let state = test_state(Some(FEED));
        let alex = add_user(&state, "Alex").await;
        let blake = add_user(&state, "Blake").await;

        let external = Calendar::external(alex.id, "Work", "https://example.com/work.ics").unwrap();
        let personal = Calendar::personal(alex.id, "Mine");
        state.store().save_calendar(external.clone()).await.unwrap();
        state.store().save_calendar(personal.clone()).await.unwrap();

        let uri = format!("/api/calendars/{}/refresh", external.id);
        let (status, body) = send(&state, "POST", &uri, Some(&alex), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "updated");
        assert_eq!(body["inserted"], 1);

        let (status, _) = send(&state, "POST", &uri, Some(&blake), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/calendars/{}/refresh", personal.id);
        let (status, body) = send(&state, "POST", &uri, Some(&alex), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not_external"));

        let failing = test_state(None);
        failing.store().save_user(alex.clone()).await.unwrap();
        failing.store().save_calendar(external.clone()).await.unwrap();
        let uri = format!("/api/calendars/{}/refresh", external.id);
        let (status, _) = send(&failing, "POST", &uri, Some(&alex), None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
