/// Database row types — these map directly to SQLite rows.
/// Distinct from circle-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct ProfileRow {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub about: Option<String>,
    pub interests: String,
    pub profile_photo_url: Option<String>,
    pub location_city: Option<String>,
}

pub struct MatchRow {
    pub id: String,
    pub party_a: String,
    pub party_b: String,
    pub message_count: i64,
    pub reveal_threshold: i64,
    pub a_revealed: bool,
    pub b_revealed: bool,
    pub status: String,
    pub version: i64,
    pub created_at: String,
    pub last_activity_at: String,
    pub ended_by: Option<String>,
    pub end_reason: Option<String>,
}

pub struct MatchMessageRow {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: String,
}

pub struct SettingsRow {
    pub user_id: String,
    pub is_enabled: bool,
    pub max_active_matches: i64,
    pub preferred_reveal_threshold: i64,
    pub auto_match: bool,
    pub notifications_enabled: bool,
    pub last_match_at: Option<String>,
}

pub struct HelpRequestRow {
    pub id: String,
    pub requester_id: String,
    pub prompt: String,
    pub status: String,
    pub helper_id: Option<String>,
    pub attempts_count: i64,
    pub similarity_score: Option<f64>,
    pub created_at: String,
    pub matched_at: Option<String>,
    pub expires_at: String,
}

pub struct GiverProfileRow {
    pub user_id: String,
    pub skills: String,
    pub categories: String,
    pub is_available: bool,
}

pub struct MatchStatsRow {
    pub total: i64,
    pub active: i64,
    pub revealed: i64,
    pub ended: i64,
}
