//! Row-to-domain parsing. The DB layer is string-typed (circle-db
//! models); everything above it works with circle-types.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use circle_db::models::{HelpRequestRow, MatchRow, ProfileRow, SettingsRow};
use circle_types::models::{
    AnonymousMatch, HelpRequest, HelpRequestStatus, MatchSettings, MatchStatus, Profile,
};
use uuid::Uuid;

use crate::MatchResult;

pub fn parse_uuid(s: &str, field: &str) -> MatchResult<Uuid> {
    Ok(s.parse::<Uuid>()
        .with_context(|| format!("corrupt {field} '{s}'"))?)
}

pub fn parse_ts(s: &str, field: &str) -> MatchResult<DateTime<Utc>> {
    Ok(s.parse::<DateTime<Utc>>()
        .with_context(|| format!("corrupt {field} '{s}'"))?)
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn match_from_row(row: &MatchRow) -> MatchResult<AnonymousMatch> {
    Ok(AnonymousMatch {
        id: parse_uuid(&row.id, "match id")?,
        party_a: parse_uuid(&row.party_a, "party_a")?,
        party_b: parse_uuid(&row.party_b, "party_b")?,
        message_count: row.message_count.max(0) as u64,
        reveal_threshold: row.reveal_threshold.max(0) as u64,
        a_revealed: row.a_revealed,
        b_revealed: row.b_revealed,
        status: MatchStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("corrupt match status '{}'", row.status))?,
        created_at: parse_ts(&row.created_at, "created_at")?,
        last_activity_at: parse_ts(&row.last_activity_at, "last_activity_at")?,
        ended_by: row
            .ended_by
            .as_deref()
            .map(|s| parse_uuid(s, "ended_by"))
            .transpose()?,
        end_reason: row.end_reason.clone(),
    })
}

pub fn profile_from_row(row: &ProfileRow) -> MatchResult<Profile> {
    Ok(Profile {
        user_id: parse_uuid(&row.user_id, "profile user_id")?,
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        username: row.username.clone(),
        age: row.age.map(|a| a.max(0) as u32),
        gender: row.gender.clone(),
        about: row.about.clone(),
        interests: serde_json::from_str(&row.interests).unwrap_or_default(),
        profile_photo_url: row.profile_photo_url.clone(),
        location_city: row.location_city.clone(),
    })
}

pub fn settings_from_row(row: &SettingsRow) -> MatchResult<MatchSettings> {
    Ok(MatchSettings {
        user_id: parse_uuid(&row.user_id, "settings user_id")?,
        is_enabled: row.is_enabled,
        max_active_matches: row.max_active_matches.max(0) as u32,
        preferred_reveal_threshold: row.preferred_reveal_threshold.max(0) as u64,
        auto_match: row.auto_match,
        notifications_enabled: row.notifications_enabled,
        last_match_at: row
            .last_match_at
            .as_deref()
            .map(|s| parse_ts(s, "last_match_at"))
            .transpose()?,
    })
}

pub fn help_request_from_row(row: &HelpRequestRow) -> MatchResult<HelpRequest> {
    Ok(HelpRequest {
        id: parse_uuid(&row.id, "help request id")?,
        requester_id: parse_uuid(&row.requester_id, "requester_id")?,
        prompt: row.prompt.clone(),
        status: HelpRequestStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("corrupt help request status '{}'", row.status))?,
        helper_id: row
            .helper_id
            .as_deref()
            .map(|s| parse_uuid(s, "helper_id"))
            .transpose()?,
        attempts_count: row.attempts_count.max(0) as u32,
        similarity_score: row.similarity_score,
        created_at: parse_ts(&row.created_at, "created_at")?,
        matched_at: row
            .matched_at
            .as_deref()
            .map(|s| parse_ts(s, "matched_at"))
            .transpose()?,
        expires_at: parse_ts(&row.expires_at, "expires_at")?,
    })
}
