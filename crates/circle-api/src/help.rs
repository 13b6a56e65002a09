use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use circle_types::api::{
    CreateHelpRequest, GiverSetupRequest, GiverToggleRequest, HelpRequestListResponse,
    HelpRequestResponse, RespondHelpRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::{blocking, notify};

pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateHelpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let request =
        blocking(move || coordinator.create_help_request(user, &req.prompt, chrono::Utc::now()))
            .await?;

    Ok((StatusCode::CREATED, Json(HelpRequestResponse { request })))
}

pub async fn request_status(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let request = blocking(move || coordinator.get_help_request(request_id, user)).await?;
    Ok(Json(HelpRequestResponse { request }))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let request = blocking(move || coordinator.cancel_help_request(request_id, user)).await?;
    Ok(Json(HelpRequestResponse { request }))
}

pub async fn complete_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let request = blocking(move || coordinator.complete_help_request(request_id, user)).await?;
    Ok(Json(HelpRequestResponse { request }))
}

pub async fn active_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let request = blocking(move || coordinator.active_help_request(user)).await?;
    Ok(Json(serde_json::json!({ "request": request })))
}

pub async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondHelpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let outcome = blocking(move || {
        coordinator.respond_to_help_request(req.request_id, user, req.accepted, chrono::Utc::now())
    })
    .await?;

    notify(&state.dispatcher, outcome.notifications).await;

    Ok(Json(HelpRequestResponse {
        request: outcome.request,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Searching requests, for the giver-facing match page.
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let limit = query.limit.min(100);
    let offset = query.offset;

    let requests = blocking(move || coordinator.list_open_help_requests(limit, offset)).await?;
    Ok(Json(HelpRequestListResponse { requests }))
}

// -- Giver profile --

pub async fn giver_setup(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GiverSetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let profile =
        blocking(move || coordinator.setup_giver_profile(user, req.skills, req.categories)).await?;
    Ok(Json(serde_json::json!({ "profile": profile })))
}

pub async fn giver_toggle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GiverToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let profile =
        blocking(move || coordinator.set_giver_availability(user, req.is_available)).await?;
    Ok(Json(serde_json::json!({ "profile": profile })))
}

pub async fn giver_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let profile = blocking(move || coordinator.giver_profile(user)).await?;
    Ok(Json(serde_json::json!({ "profile": profile })))
}
