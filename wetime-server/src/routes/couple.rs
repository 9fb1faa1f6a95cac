//! Couple linking endpoints

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use wetime_core::couple::{self, CoupleStatus, couple_status};
use wetime_core::{Calendar, Couple};

use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/couple", get(status))
        .route("/api/couple/create", post(create))
        .route("/api/couple/join", post(join))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub couple: Option<CoupleStatus>,
}

#[derive(Serialize)]
pub struct CreateResponse {
    pub couple: Couple,
    pub calendar: Calendar,
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub couple: Couple,
}

#[derive(Deserialize)]
pub struct JoinRequest {
    pub code: String,
}

/// GET /api/couple - The caller's couple and partner, or null
async fn status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StatusResponse>, AppError> {
    let couple = couple_status(state.store(), &user).await?;
    Ok(Json(StatusResponse { couple }))
}

/// POST /api/couple/create
async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<CreateResponse>), AppError> {
    let (couple, calendar) = couple::create_couple(state.store(), user.id).await?;
    Ok((StatusCode::CREATED, Json(CreateResponse { couple, calendar })))
}

/// POST /api/couple/join
async fn join(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    let couple = couple::join_couple(state.store(), user.id, &req.code).await?;
    Ok(Json(JoinResponse { couple }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_join_and_status() {
        let state = test_state(None);
        let alex = add_user(&state, "Alex").await;
        let blake = add_user(&state, "Blake").await;
        let casey = add_user(&state, "Casey").await;

        let (_, body) = send(&state, "GET", "/api/couple", Some(&alex), None).await;
        assert!(body["couple"].is_null());

        let (status, body) = send(&state, "POST", "/api/couple/create", Some(&alex), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["calendar"]["kind"], "SHARED");
        let code = body["couple"]["joinCode"].as_str().unwrap().to_string();

        let (status, _) = send(&state, "POST", "/api/couple/create", Some(&alex), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &state,
            "POST",
            "/api/couple/join",
            Some(&blake),
            Some(json!({"code": "ZZZZZZZZ"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &state,
            "POST",
            "/api/couple/join",
            Some(&blake),
            Some(json!({"code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &state,
            "POST",
            "/api/couple/join",
            Some(&casey),
            Some(json!({"code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = send(&state, "GET", "/api/couple", Some(&alex), None).await;
        assert_eq!(body["couple"]["code"], code.as_str());
        assert_eq!(body["couple"]["partner"]["name"], "Blake");
    }
}
