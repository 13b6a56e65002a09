use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// How much of an anonymous match has been revealed. Derived from the two
/// per-party flags; `BothRevealed` is never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    Hidden,
    PartyARevealed,
    PartyBRevealed,
    BothRevealed,
}

impl RevealState {
    pub fn from_flags(a_revealed: bool, b_revealed: bool) -> Self {
        match (a_revealed, b_revealed) {
            (false, false) => Self::Hidden,
            (true, false) => Self::PartyARevealed,
            (false, true) => Self::PartyBRevealed,
            (true, true) => Self::BothRevealed,
        }
    }

    pub fn is_both_revealed(&self) -> bool {
        matches!(self, Self::BothRevealed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Expired,
    Closed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// An anonymous match between two users. Both parties see each other
/// masked until both reveal flags are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousMatch {
    pub id: Uuid,
    pub party_a: Uuid,
    pub party_b: Uuid,
    pub message_count: u64,
    pub reveal_threshold: u64,
    pub a_revealed: bool,
    pub b_revealed: bool,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ended_by: Option<Uuid>,
    pub end_reason: Option<String>,
}

impl AnonymousMatch {
    pub fn reveal_state(&self) -> RevealState {
        RevealState::from_flags(self.a_revealed, self.b_revealed)
    }

    /// Which side of the match `user` is on, if any.
    pub fn party_of(&self, user: Uuid) -> Option<Party> {
        if user == self.party_a {
            Some(Party::A)
        } else if user == self.party_b {
            Some(Party::B)
        } else {
            None
        }
    }

    pub fn counterpart_of(&self, user: Uuid) -> Option<Uuid> {
        match self.party_of(user)? {
            Party::A => Some(self.party_b),
            Party::B => Some(self.party_a),
        }
    }

    pub fn revealed_by(&self, party: Party) -> bool {
        match party {
            Party::A => self.a_revealed,
            Party::B => self.b_revealed,
        }
    }

    pub fn messages_until_reveal(&self) -> u64 {
        self.reveal_threshold.saturating_sub(self.message_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    A,
    B,
}

/// A user's full profile as stored. Never serialized to a counterpart
/// directly — it passes through masking first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub about: Option<String>,
    pub interests: Vec<String>,
    pub profile_photo_url: Option<String>,
    pub location_city: Option<String>,
}

/// The counterpart profile a party is allowed to see. Identifying fields
/// are present only once the match is mutually revealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskedProfile {
    pub display_name: String,
    pub username: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub about: Option<String>,
    pub interests: Vec<String>,
    pub profile_photo_url: Option<String>,
    pub location_city: Option<String>,
    pub anonymous_avatar: Option<String>,
    pub is_revealed: bool,
}

/// Per-user blind dating preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSettings {
    pub user_id: Uuid,
    pub is_enabled: bool,
    pub max_active_matches: u32,
    pub preferred_reveal_threshold: u64,
    pub auto_match: bool,
    pub notifications_enabled: bool,
    pub last_match_at: Option<DateTime<Utc>>,
}

pub const DEFAULT_REVEAL_THRESHOLD: u64 = 30;
pub const MIN_REVEAL_THRESHOLD: u64 = 10;
pub const MAX_REVEAL_THRESHOLD: u64 = 100;
pub const DEFAULT_MAX_ACTIVE_MATCHES: u32 = 3;

impl MatchSettings {
    pub fn defaults(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_enabled: false,
            max_active_matches: DEFAULT_MAX_ACTIVE_MATCHES,
            preferred_reveal_threshold: DEFAULT_REVEAL_THRESHOLD,
            auto_match: false,
            notifications_enabled: true,
            last_match_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelpRequestStatus {
    Searching,
    Matched,
    Completed,
    Expired,
    Cancelled,
}

impl HelpRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::Matched => "matched",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "searching" => Some(Self::Searching),
            "matched" => Some(Self::Matched),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// An anonymous "I need help with X" request, offered to available givers
/// until one accepts or the request times out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub prompt: String,
    pub status: HelpRequestStatus,
    pub helper_id: Option<Uuid>,
    pub attempts_count: u32,
    pub similarity_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// A giver's offering: what they can help with and whether they are
/// currently taking requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiverProfile {
    pub user_id: Uuid,
    pub skills: Vec<String>,
    pub categories: Vec<String>,
    pub is_available: bool,
}

/// Aggregate match counts for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStats {
    pub total_matches: u64,
    pub active_matches: u64,
    pub revealed_matches: u64,
    pub ended_matches: u64,
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_state_from_flags() {
        assert_eq!(RevealState::from_flags(false, false), RevealState::Hidden);
        assert_eq!(RevealState::from_flags(true, false), RevealState::PartyARevealed);
        assert_eq!(RevealState::from_flags(false, true), RevealState::PartyBRevealed);
        assert_eq!(RevealState::from_flags(true, true), RevealState::BothRevealed);
    }

    #[test]
    fn party_lookup_is_symmetric() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let m = AnonymousMatch {
            id: Uuid::new_v4(),
            party_a: a,
            party_b: b,
            message_count: 0,
            reveal_threshold: 30,
            a_revealed: false,
            b_revealed: false,
            status: MatchStatus::Active,
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            ended_by: None,
            end_reason: None,
        };

        assert_eq!(m.party_of(a), Some(Party::A));
        assert_eq!(m.party_of(b), Some(Party::B));
        assert_eq!(m.party_of(Uuid::new_v4()), None);
        assert_eq!(m.counterpart_of(a), Some(b));
        assert_eq!(m.counterpart_of(b), Some(a));
    }

    #[test]
    fn messages_until_reveal_saturates() {
        let mut m = AnonymousMatch {
            id: Uuid::new_v4(),
            party_a: Uuid::new_v4(),
            party_b: Uuid::new_v4(),
            message_count: 29,
            reveal_threshold: 30,
            a_revealed: false,
            b_revealed: false,
            status: MatchStatus::Active,
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            ended_by: None,
            end_reason: None,
        };
        assert_eq!(m.messages_until_reveal(), 1);

        m.message_count = 45;
        assert_eq!(m.messages_until_reveal(), 0);
    }
}
