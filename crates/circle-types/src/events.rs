use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MaskedProfile, RevealState};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new anonymous match was created for this user
    MatchCreated {
        match_id: Uuid,
        reveal_threshold: u64,
        counterpart: MaskedProfile,
    },

    /// A new message was delivered in a match conversation
    MessageCreate {
        id: Uuid,
        match_id: Uuid,
        sender_label: String,
        body: String,
        message_count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Acknowledgment to the requester: their reveal is registered and
    /// waiting on the counterpart
    RevealPending { match_id: Uuid, reveal_state: RevealState },

    /// The counterpart has asked to reveal. Carries no identity — the
    /// recipient only learns that a reveal is pending.
    PartyRevealed { match_id: Uuid, reveal_state: RevealState },

    /// Both parties consented. Carries the counterpart's unmasked profile.
    BothRevealed {
        match_id: Uuid,
        counterpart: MaskedProfile,
    },

    /// A party closed the match
    MatchEnded {
        match_id: Uuid,
        reason: Option<String>,
    },

    /// The match went stale and was expired by the server
    MatchExpired { match_id: Uuid },

    /// A giver accepted this user's help request
    HelpRequestMatched { request_id: Uuid },

    /// A help request timed out or ran out of helpers
    HelpRequestExpired { request_id: Uuid },
}

impl GatewayEvent {
    /// Every match/help event is addressed to a specific user; only
    /// `Ready` is connection-local. Used by tests to assert fan-out.
    pub fn match_id(&self) -> Option<Uuid> {
        match self {
            Self::MatchCreated { match_id, .. }
            | Self::MessageCreate { match_id, .. }
            | Self::RevealPending { match_id, .. }
            | Self::PartyRevealed { match_id, .. }
            | Self::BothRevealed { match_id, .. }
            | Self::MatchEnded { match_id, .. }
            | Self::MatchExpired { match_id } => Some(*match_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_for_the_socket_contract() {
        let match_id = Uuid::new_v4();
        let event = GatewayEvent::PartyRevealed {
            match_id,
            reveal_state: crate::models::RevealState::PartyARevealed,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PartyRevealed");
        assert_eq!(json["data"]["match_id"], match_id.to_string());
        assert_eq!(json["data"]["reveal_state"], "party_a_revealed");
    }

    #[test]
    fn ready_is_connection_local() {
        let ready = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
        };
        assert_eq!(ready.match_id(), None);

        let match_id = Uuid::new_v4();
        let expired = GatewayEvent::MatchExpired { match_id };
        assert_eq!(expired.match_id(), Some(match_id));
    }
}
