use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use circle_match::matchmaker::FindMatchOutcome;
use circle_match::Coordinator;
use circle_types::api::{
    EndMatchRequest, FindMatchResponse, MatchListResponse, MatchView, RevealResponse,
    StatsResponse,
};
use circle_types::models::AnonymousMatch;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::{blocking, notify};

/// Project a match into one party's view: counterpart masked per the
/// current reveal state, plus the reveal progress the client renders.
fn match_view(
    coordinator: &Coordinator,
    m: &AnonymousMatch,
    viewer: Uuid,
) -> Result<MatchView, circle_match::MatchError> {
    let party = m.party_of(viewer).ok_or(circle_match::MatchError::Unauthorized)?;
    let counterpart = coordinator.masked_counterpart(m, viewer)?;
    let other_party = match party {
        circle_types::models::Party::A => circle_types::models::Party::B,
        circle_types::models::Party::B => circle_types::models::Party::A,
    };

    Ok(MatchView {
        id: m.id,
        status: m.status.as_str().to_string(),
        reveal_state: m.reveal_state(),
        message_count: m.message_count,
        reveal_threshold: m.reveal_threshold,
        can_reveal: m.message_count >= m.reveal_threshold && !m.revealed_by(party),
        messages_until_reveal: m.messages_until_reveal(),
        has_revealed_self: m.revealed_by(party),
        other_has_revealed: m.revealed_by(other_party),
        counterpart,
        created_at: m.created_at,
    })
}

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let matches = blocking(move || {
        let mut views = Vec::new();
        for m in coordinator.matches_for(user)? {
            views.push(match_view(&coordinator, &m, user)?);
        }
        Ok(views)
    })
    .await?;

    Ok(Json(MatchListResponse { matches }))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let view = blocking(move || {
        let m = coordinator.get_match_for(match_id, user)?;
        match_view(&coordinator, &m, user)
    })
    .await?;

    Ok(Json(view))
}

pub async fn find_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let outcome = blocking(move || coordinator.find_match(user, chrono::Utc::now())).await?;

    let response = match outcome {
        FindMatchOutcome::Created {
            created,
            notifications,
        } => {
            notify(&state.dispatcher, notifications).await;
            let coordinator = state.coordinator.clone();
            let view =
                blocking(move || match_view(&coordinator, &created, user)).await?;
            FindMatchResponse {
                success: true,
                message: "You have a new match".to_string(),
                match_view: Some(view),
            }
        }
        FindMatchOutcome::Disabled => FindMatchResponse {
            success: false,
            message: "Enable blind dating first".to_string(),
            match_view: None,
        },
        FindMatchOutcome::AtCapacity => FindMatchResponse {
            success: false,
            message: "You are at your active match limit".to_string(),
            match_view: None,
        },
        FindMatchOutcome::NoCandidates => FindMatchResponse {
            success: false,
            message: "No one is available right now, try again later".to_string(),
            match_view: None,
        },
    };

    Ok(Json(response))
}

pub async fn request_reveal(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let outcome = blocking(move || coordinator.request_reveal(match_id, user)).await?;

    notify(&state.dispatcher, outcome.notifications).await;

    Ok(Json(RevealResponse {
        success: true,
        both_revealed: outcome.both_revealed,
        match_id: outcome.match_id,
        reveal_state: outcome.reveal_state,
    }))
}

pub async fn end_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EndMatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let outcome =
        blocking(move || coordinator.end_match(match_id, user, req.reason.as_deref())).await?;

    notify(&state.dispatcher, outcome.notifications).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "match_id": outcome.match_id,
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let stats = blocking(move || coordinator.stats_for(user)).await?;
    Ok(Json(StatsResponse { stats }))
}
