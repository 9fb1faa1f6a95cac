pub mod admin;
pub mod assistant;
pub mod calendars;
pub mod couple;
pub mod events;
pub mod internal;
pub mod notifications;
pub mod users;

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

use wetime_core::{User, WeTimeError};

use crate::state::AppState;

/// Header set by the authenticating proxy in front of the server
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(events::router())
        .merge(calendars::router())
        .merge(couple::router())
        .merge(notifications::router())
        .merge(assistant::router())
        .merge(internal::router())
        .merge(admin::router())
}

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors rendered as `{ "error": ... }` with a status picked from the cause
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn new(status: StatusCode, message: &str) -> Self {
        AppError {
            status,
            error: anyhow::anyhow!(message.to_string()),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

fn status_for(error: &anyhow::Error) -> StatusCode {
    match error.downcast_ref::<WeTimeError>() {
        Some(WeTimeError::VisibilityDenied(_)) => StatusCode::FORBIDDEN,
        Some(WeTimeError::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(
            WeTimeError::InvalidWindow(_)
            | WeTimeError::InvalidRule { .. }
            | WeTimeError::Serialization(_)
            | WeTimeError::FeedParse(_)
            | WeTimeError::Invalid(_),
        ) => StatusCode::BAD_REQUEST,
        Some(WeTimeError::FeedFetch { .. }) => StatusCode::BAD_GATEWAY,
        Some(WeTimeError::Couple(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.error, "Request failed");
        }
        let body = Json(ErrorResponse {
            error: self.error.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        AppError {
            status: status_for(&error),
            error,
        }
    }
}

/// The caller, identified by the `x-user-id` header
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(AppError::unauthorized)?;

        let user = state
            .store()
            .user(id)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        Ok(CurrentUser(user))
    }
}
