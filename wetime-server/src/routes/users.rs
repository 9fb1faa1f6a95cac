//! User provisioning and profile endpoints
//!
//! Credentials are handled by the proxy in front of the server; these routes
//! only keep the profile the engine needs.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use wetime_core::User;

use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/me", get(get_profile).patch(update_profile))
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub time_zone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub time_zone: Option<String>,
}

fn check_time_zone(tz: &str) -> Result<(), AppError> {
    tz.parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|_| AppError::new(StatusCode::BAD_REQUEST, "invalid_time_zone"))
}

async fn email_taken(state: &AppState, email: &str) -> Result<bool, AppError> {
    Ok(state
        .store()
        .users()
        .await?
        .iter()
        .any(|u| u.email.eq_ignore_ascii_case(email)))
}

/// POST /api/users - Provision a user
async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let name = req.name.trim();
    let email = req.email.trim();
    if name.is_empty() || !email.contains('@') {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "name and email are required"));
    }
    let time_zone = req.time_zone.as_deref().unwrap_or("UTC");
    check_time_zone(time_zone)?;

    if email_taken(&state, email).await? {
        return Err(AppError::new(StatusCode::CONFLICT, "email_taken"));
    }

    let user = User::new(name, email, time_zone);
    state.store().save_user(user.clone()).await?;
    tracing::info!(user = %user.id, "Provisioned user");

    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// GET /api/me
async fn get_profile(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse { user })
}

/// PATCH /api/me
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(mut user): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if let Some(email) = req.email.as_deref().map(str::trim)
        && !email.eq_ignore_ascii_case(&user.email)
    {
        if email_taken(&state, email).await? {
            return Err(AppError::new(StatusCode::CONFLICT, "email_taken"));
        }
        user.email = email.to_string();
    }
    if let Some(name) = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        user.name = name.to_string();
    }
    if let Some(tz) = req.time_zone {
        check_time_zone(&tz)?;
        user.time_zone = tz;
    }

    state.store().save_user(user.clone()).await?;
    Ok(Json(UserResponse { user }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_provision_and_profile() {
        let state = test_state(None);

        let (status, body) = send(
            &state,
            "POST",
            "/api/users",
            None,
            Some(json!({"name": "Alex", "email": "alex@example.com", "timeZone": "Europe/Paris"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["timeZone"], "Europe/Paris");

        let (status, _) = send(
            &state,
            "POST",
            "/api/users",
            None,
            Some(json!({"name": "Alex 2", "email": "ALEX@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let id: uuid::Uuid = body["user"]["id"].as_str().unwrap().parse().unwrap();
        let alex = state.store().user(id).await.unwrap().unwrap();
        let (status, body) = send(
            &state,
            "PATCH",
            "/api/me",
            Some(&alex),
            Some(json!({"name": "Alexandra", "timeZone": "Mars/Base"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_time_zone");

        let (status, body) = send(
            &state,
            "PATCH",
            "/api/me",
            Some(&alex),
            Some(json!({"name": "Alexandra"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Alexandra");
    }
}
