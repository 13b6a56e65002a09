use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use circle_types::api::{MessageResponse, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::{blocking, notify};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Message delivery for a match conversation. The client supplies the
/// message id, so a retried POST lands on the same id and the count is
/// bumped at most once.
pub async fn send_message(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;
    let body = req.body.clone();
    let now = chrono::Utc::now();

    let outcome =
        blocking(move || coordinator.record_message(match_id, req.id, user, &body, now)).await?;

    notify(&state.dispatcher, outcome.notifications).await;

    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(MessageResponse {
            id: req.id,
            match_id,
            sender_label: "You".to_string(),
            mine: true,
            body: req.body,
            created_at: now,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;
    let limit = query.limit.min(200);

    let messages = blocking(move || coordinator.conversation(match_id, user, limit)).await?;

    let messages: Vec<MessageResponse> = messages
        .into_iter()
        .map(|m| MessageResponse {
            id: m.id,
            match_id,
            sender_label: if m.mine { "You".to_string() } else { m.sender_label },
            mine: m.mine,
            body: m.body,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(messages))
}
