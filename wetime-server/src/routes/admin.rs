//! Store-wide listings and maintenance, admin users only

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use wetime_core::admin::{
    self, CalendarOverview, CoupleOverview, EventPage, UserOverview, ensure_admin,
};
use wetime_core::dedup::remove_duplicates;

use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/couples", get(list_couples))
        .route("/api/admin/calendars", get(list_calendars))
        .route("/api/admin/events", get(list_events))
        .route("/api/admin/cleanup-duplicates", post(cleanup_duplicates))
}

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserOverview>,
}

#[derive(Serialize)]
pub struct CouplesResponse {
    pub couples: Vec<CoupleOverview>,
}

#[derive(Serialize)]
pub struct CalendarsResponse {
    pub calendars: Vec<CalendarOverview>,
}

#[derive(Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub deleted: usize,
    pub duplicate_groups: usize,
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UsersResponse>, AppError> {
    ensure_admin(&user)?;
    let users = admin::list_users(state.store()).await?;
    Ok(Json(UsersResponse { users }))
}

/// GET /api/admin/couples
async fn list_couples(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CouplesResponse>, AppError> {
    ensure_admin(&user)?;
    let couples = admin::list_couples(state.store()).await?;
    Ok(Json(CouplesResponse { couples }))
}

/// GET /api/admin/calendars
async fn list_calendars(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CalendarsResponse>, AppError> {
    ensure_admin(&user)?;
    let calendars = admin::list_calendars(state.store()).await?;
    Ok(Json(CalendarsResponse { calendars }))
}

/// GET /api/admin/events?limit=..&offset=.. - Newest first
async fn list_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<EventPage>, AppError> {
    ensure_admin(&user)?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let page = admin::list_events(state.store(), limit, params.offset.unwrap_or(0)).await?;
    Ok(Json(page))
}

/// POST /api/admin/cleanup-duplicates
async fn cleanup_duplicates(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CleanupResponse>, AppError> {
    ensure_admin(&user)?;

    let report = remove_duplicates(state.store()).await?;

    Ok(Json(CleanupResponse {
        deleted: report.removed_ids.len(),
        duplicate_groups: report.group_count,
    }))
}
