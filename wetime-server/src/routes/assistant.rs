//! Assistant endpoint
//!
//! The chat client posts the model's reply here; an embedded event request is
//! turned into a real event before the reply goes back to the user.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use wetime_core::Occurrence;
use wetime_core::assistant::{create_from_draft, parse_event_creation};

use crate::routes::{AppError, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/assistant/reply", post(handle_reply))
}

#[derive(Deserialize)]
pub struct ReplyRequest {
    pub reply: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub response: String,
    pub event_created: bool,
    pub event: Option<Occurrence>,
}

/// POST /api/assistant/reply
async fn handle_reply(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let event = match parse_event_creation(&req.reply) {
        Some(draft) => create_from_draft(state.store(), &user, &draft, Utc::now()).await,
        None => None,
    };

    Ok(Json(ReplyResponse {
        response: req.reply,
        event_created: event.is_some(),
        event,
    }))
}
