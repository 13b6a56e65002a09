use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{HelpRequest, MaskedProfile, MatchSettings, MatchStats, RevealState};

// -- JWT Claims --

/// JWT claims shared across circle-api (REST middleware) and
/// circle-gateway (WebSocket authentication). Canonical definition lives
/// here in circle-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Settings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub is_enabled: Option<bool>,
    pub max_active_matches: Option<u32>,
    pub preferred_reveal_threshold: Option<u64>,
    pub auto_match: Option<bool>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: MatchSettings,
}

// -- Matches --

/// One match as seen by one of its parties: counterpart always masked
/// according to the current reveal state.
#[derive(Debug, Serialize)]
pub struct MatchView {
    pub id: Uuid,
    pub status: String,
    pub reveal_state: RevealState,
    pub message_count: u64,
    pub reveal_threshold: u64,
    pub can_reveal: bool,
    pub messages_until_reveal: u64,
    pub has_revealed_self: bool,
    pub other_has_revealed: bool,
    pub counterpart: MaskedProfile,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MatchListResponse {
    pub matches: Vec<MatchView>,
}

#[derive(Debug, Serialize)]
pub struct FindMatchResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_view: Option<MatchView>,
}

#[derive(Debug, Serialize)]
pub struct RevealResponse {
    pub success: bool,
    pub both_revealed: bool,
    pub match_id: Uuid,
    pub reveal_state: RevealState,
}

#[derive(Debug, Deserialize, Default)]
pub struct EndMatchRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: MatchStats,
}

// -- Conversation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    /// Client-generated message id, the delivery idempotency key.
    pub id: Uuid,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_label: String,
    pub mine: bool,
    pub body: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Help requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateHelpRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondHelpRequest {
    pub request_id: Uuid,
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct HelpRequestResponse {
    pub request: HelpRequest,
}

#[derive(Debug, Serialize)]
pub struct HelpRequestListResponse {
    pub requests: Vec<HelpRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GiverSetupRequest {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GiverToggleRequest {
    pub is_available: bool,
}
