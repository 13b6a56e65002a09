use axum::{extract::State, response::IntoResponse, Extension, Json};

use circle_match::matchmaker::SettingsPatch;
use circle_types::api::{SettingsResponse, UpdateSettingsRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::blocking;

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let settings = blocking(move || coordinator.settings_of(user)).await?;
    Ok(Json(SettingsResponse { settings }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinator = state.coordinator.clone();
    let user = claims.sub;

    let settings = blocking(move || {
        coordinator.update_settings(
            user,
            SettingsPatch {
                is_enabled: req.is_enabled,
                max_active_matches: req.max_active_matches,
                preferred_reveal_threshold: req.preferred_reveal_threshold,
                auto_match: req.auto_match,
                notifications_enabled: req.notifications_enabled,
            },
        )
    })
    .await?;

    Ok(Json(SettingsResponse { settings }))
}

pub async fn enable(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    set_enabled(state, claims.sub, true).await
}

pub async fn disable(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    set_enabled(state, claims.sub, false).await
}

async fn set_enabled(
    state: AppState,
    user: uuid::Uuid,
    enabled: bool,
) -> Result<Json<SettingsResponse>, ApiError> {
    let coordinator = state.coordinator.clone();
    let settings = blocking(move || coordinator.set_enabled(user, enabled)).await?;
    Ok(Json(SettingsResponse { settings }))
}
