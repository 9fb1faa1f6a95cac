//! Internal cron endpoints, called by the worker with the shared token

use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
use chrono::Utc;
use serde::Serialize;

use wetime_core::constants::INTERNAL_TOKEN_HEADER;
use wetime_core::reminders::{ReminderRun, send_reminders};
use wetime_core::sync::{CalendarSync, sync_all};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/internal/cron/refresh-ics", post(refresh_ics))
        .route("/api/internal/cron/send-reminders", post(reminders))
}

fn require_cron_token(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let presented = headers
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if state.config.accepts_cron_token(presented) {
        Ok(())
    } else {
        tracing::warn!("Rejected internal cron call");
        Err(AppError::unauthorized())
    }
}

#[derive(Serialize)]
pub struct RefreshResponse {
    /// Calendars whose feed changed and was reconciled
    pub refreshed: usize,
    /// Feed entries processed across all calendars
    pub events: usize,
    pub calendars: Vec<CalendarSync>,
}

/// POST /api/internal/cron/refresh-ics - Refresh every external calendar
async fn refresh_ics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AppError> {
    require_cron_token(&state, &headers)?;

    let report = sync_all(state.store(), state.fetcher.as_ref()).await?;
    let (refreshed, _, _) = report.status_counts();

    Ok(Json(RefreshResponse {
        refreshed,
        events: report.processed(),
        calendars: report.0,
    }))
}

/// POST /api/internal/cron/send-reminders
async fn reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReminderRun>, AppError> {
    require_cron_token(&state, &headers)?;

    let run = send_reminders(state.store(), state.notifier.as_ref(), Utc::now()).await?;
    Ok(Json(run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wetime_core::Calendar;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:one\r\n\
SUMMARY:One\r\n\
DTSTART:20240605T140000Z\r\n\
DTEND:20240605T150000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:two\r\n\
SUMMARY:Two\r\n\
DTSTART:20240606T140000Z\r\n\
DTEND:20240606T150000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    async fn post_with_token(
        state: &AppState,
        uri: &str,
        token: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header(INTERNAL_TOKEN_HEADER, token);
        }
        let response = app(state)
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_token_must_match_exactly() {
        let state = test_state(Some(FEED));
        for token in [None, Some("wrong"), Some("test-token ")] {
            let (status, body) =
                post_with_token(&state, "/api/internal/cron/refresh-ics", token).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "Unauthorized");
        }
    }

    #[tokio::test]
    async fn test_refresh_reports_per_calendar() {
        let state = test_state(Some(FEED));
        let alex = add_user(&state, "Alex").await;
        let external =
            Calendar::external(alex.id, "Work", "https://example.com/work.ics").unwrap();
        state.store().save_calendar(external.clone()).await.unwrap();

        let (status, body) =
            post_with_token(&state, "/api/internal/cron/refresh-ics", Some(CRON_TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refreshed"], 1);
        assert_eq!(body["events"], 2);
        assert_eq!(body["calendars"][0]["calendarId"], external.id.to_string());
        assert_eq!(body["calendars"][0]["status"], "updated");

        // Second run matches by UID instead of inserting again
        post_with_token(&state, "/api/internal/cron/refresh-ics", Some(CRON_TOKEN)).await;
        assert_eq!(
            state
                .store()
                .occurrences_in_calendar(external.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_reminders_run_with_token() {
        let state = test_state(None);
        let (status, body) =
            post_with_token(&state, "/api/internal/cron/send-reminders", Some(CRON_TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["due"], 0);
        assert_eq!(body["sent"], 0);
    }
}
