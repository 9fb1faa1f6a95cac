//! In-app notifications and reminder preferences

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use wetime_core::{Notification, NotificationPreference, WeTimeError};

use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list).patch(mark_read))
        .route(
            "/api/settings/notifications",
            get(get_preferences).patch(update_preferences),
        )
}

#[derive(Deserialize)]
pub struct ListParams {
    pub read: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub id: Uuid,
    pub read: bool,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub ok: bool,
}

/// Fields omitted from the body keep their stored value. An explicit
/// `null` lead time turns reminders off.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    #[serde(default, deserialize_with = "present")]
    pub reminder_minutes_before: Option<Option<u32>>,
    pub notify_email: Option<bool>,
    pub notify_web: Option<bool>,
}

/// Distinguishes a field set to `null` (`Some(None)`) from an absent one (`None`).
fn present<'de, D>(deserializer: D) -> Result<Option<Option<u32>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(Some)
}

/// GET /api/notifications?read=false&limit=20 - Newest first
async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<NotificationsResponse>, AppError> {
    let all = state.store().notifications_for(user.id).await?;
    let unread_count = all.iter().filter(|n| !n.read).count();

    let notifications = all
        .into_iter()
        .filter(|n| params.read.is_none_or(|read| n.read == read))
        .take(params.limit.unwrap_or(DEFAULT_LIMIT))
        .collect();

    Ok(Json(NotificationsResponse {
        notifications,
        unread_count,
    }))
}

/// PATCH /api/notifications - Set the read flag of one notification
async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, AppError> {
    if !state
        .store()
        .set_notification_read(user.id, req.id, req.read)
        .await?
    {
        return Err(WeTimeError::NotFound("Notification".to_string()).into());
    }
    Ok(Json(MarkReadResponse { ok: true }))
}

/// GET /api/settings/notifications
async fn get_preferences(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<NotificationPreference>, AppError> {
    Ok(Json(state.store().notification_preference(user.id).await?))
}

/// PATCH /api/settings/notifications
async fn update_preferences(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<PreferenceUpdate>,
) -> Result<Json<NotificationPreference>, AppError> {
    let mut preference = state.store().notification_preference(user.id).await?;

    if let Some(lead) = req.reminder_minutes_before {
        if lead == Some(0) {
            return Err(WeTimeError::Invalid("reminder lead must be positive".to_string()).into());
        }
        preference.reminder_minutes_before = lead;
    }
    if let Some(email) = req.notify_email {
        preference.notify_email = email;
    }
    if let Some(web) = req.notify_web {
        preference.notify_web = web;
    }

    state
        .store()
        .save_notification_preference(user.id, preference.clone())
        .await?;
    Ok(Json(preference))
}
