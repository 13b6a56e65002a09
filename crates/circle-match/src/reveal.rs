//! The mutual-consent reveal protocol.
//!
//! State machine per match: `hidden -> {party_a_revealed | party_b_revealed}
//! -> both_revealed`, orthogonal to `active -> expired/closed`. Transitions
//! only move forward. The reveal-flag update is the one critical section:
//! it is applied as a version-guarded conditional write so two parties
//! revealing at the same instant (possibly on different server instances)
//! cannot lose an update.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use circle_types::events::GatewayEvent;
use circle_types::models::{AnonymousMatch, MaskedProfile, MatchStatus, Party, Profile, RevealState};

use crate::convert;
use crate::masking;
use crate::{Coordinator, MatchError, MatchResult, Notifications};

#[derive(Debug)]
pub struct RevealOutcome {
    pub match_id: Uuid,
    pub reveal_state: RevealState,
    pub both_revealed: bool,
    pub notifications: Notifications,
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub message_count: u64,
    /// True when the message id had already been recorded; the count was
    /// not bumped again.
    pub duplicate: bool,
    pub notifications: Notifications,
}

#[derive(Debug)]
pub struct EndOutcome {
    pub match_id: Uuid,
    pub notifications: Notifications,
}

#[derive(Debug)]
pub struct ExpireOutcome {
    pub expired: Vec<Uuid>,
    pub notifications: Notifications,
}

/// One message of a match conversation, labeled for a specific viewer.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_label: String,
    pub mine: bool,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Coordinator {
    /// Load a match and authenticate the caller as one of its parties.
    pub fn get_match_for(&self, match_id: Uuid, user: Uuid) -> MatchResult<AnonymousMatch> {
        let row = self
            .db()
            .get_match(&match_id.to_string())?
            .ok_or(MatchError::NotFound)?;
        let m = convert::match_from_row(&row)?;
        if m.party_of(user).is_none() {
            return Err(MatchError::Unauthorized);
        }
        Ok(m)
    }

    /// A party asks to reveal their identity.
    ///
    /// The threshold check and the flag flip must be atomic against
    /// concurrent reveals, so the flip is conditional on the version we
    /// read. Concurrent message delivery does not bump the version —
    /// the count only grows, so a threshold that held at read time still
    /// holds at write time and deliveries never force spurious retries.
    pub fn request_reveal(&self, match_id: Uuid, requesting_user: Uuid) -> MatchResult<RevealOutcome> {
        let id = match_id.to_string();

        for attempt in 0..self.config().reveal_retry_attempts {
            let row = self.db().get_match(&id)?.ok_or(MatchError::NotFound)?;
            let m = convert::match_from_row(&row)?;
            let party = m.party_of(requesting_user).ok_or(MatchError::Unauthorized)?;

            if m.status != MatchStatus::Active {
                return Err(MatchError::MatchNotActive);
            }
            if m.message_count < m.reveal_threshold {
                return Err(MatchError::ThresholdNotMet {
                    remaining: m.reveal_threshold - m.message_count,
                });
            }
            if m.revealed_by(party) {
                return Err(MatchError::AlreadyRevealed);
            }

            if !self
                .db()
                .try_set_reveal_flag(&id, party == Party::A, row.version)?
            {
                debug!(match_id = %match_id, attempt, "reveal update lost the version race, retrying");
                std::thread::sleep(std::time::Duration::from_millis(5 << attempt));
                continue;
            }

            // The write applied against exactly the state we read, so the
            // new flags are the read flags plus ours. Only the call that
            // sets the second flag observes both_revealed — that is what
            // makes the BothRevealed pair fire exactly once.
            let reveal_state = match party {
                Party::A => RevealState::from_flags(true, m.b_revealed),
                Party::B => RevealState::from_flags(m.a_revealed, true),
            };
            let both = reveal_state.is_both_revealed();

            let counterpart = m
                .counterpart_of(requesting_user)
                .ok_or(MatchError::Unauthorized)?;

            let notifications = if both {
                info!(match_id = %match_id, "match mutually revealed");
                let requester_profile = self.profile_of(requesting_user)?;
                let counterpart_profile = self.profile_of(counterpart)?;
                vec![
                    (
                        requesting_user,
                        GatewayEvent::BothRevealed {
                            match_id,
                            counterpart: masking::mask_profile(match_id, &counterpart_profile, true),
                        },
                    ),
                    (
                        counterpart,
                        GatewayEvent::BothRevealed {
                            match_id,
                            counterpart: masking::mask_profile(match_id, &requester_profile, true),
                        },
                    ),
                ]
            } else {
                // The counterpart learns a reveal is pending, nothing more.
                vec![
                    (
                        requesting_user,
                        GatewayEvent::RevealPending {
                            match_id,
                            reveal_state,
                        },
                    ),
                    (
                        counterpart,
                        GatewayEvent::PartyRevealed {
                            match_id,
                            reveal_state,
                        },
                    ),
                ]
            };

            return Ok(RevealOutcome {
                match_id,
                reveal_state,
                both_revealed: both,
                notifications,
            });
        }

        Err(MatchError::Conflict)
    }

    /// The counterpart's profile as the viewer may see it right now.
    pub fn masked_view(&self, match_id: Uuid, viewer: Uuid) -> MatchResult<MaskedProfile> {
        let m = self.get_match_for(match_id, viewer)?;
        Ok(self.masked_counterpart(&m, viewer)?)
    }

    /// Masking for an already-loaded match. Unmasked if and only if the
    /// match is in `both_revealed`.
    pub fn masked_counterpart(
        &self,
        m: &AnonymousMatch,
        viewer: Uuid,
    ) -> MatchResult<MaskedProfile> {
        let counterpart = m.counterpart_of(viewer).ok_or(MatchError::Unauthorized)?;
        let profile = self.profile_of(counterpart)?;
        let revealed = m.reveal_state().is_both_revealed();
        Ok(masking::mask_profile(m.id, &profile, revealed))
    }

    /// Record a delivered conversation message: at most one count bump
    /// per message id, and the counterpart gets a `MessageCreate` event
    /// labeled with the sender's current (masked or revealed) name.
    pub fn record_message(
        &self,
        match_id: Uuid,
        message_id: Uuid,
        sender: Uuid,
        body: &str,
        now: DateTime<Utc>,
    ) -> MatchResult<RecordOutcome> {
        let m = self.get_match_for(match_id, sender)?;
        if m.status != MatchStatus::Active {
            return Err(MatchError::MatchNotActive);
        }

        let counterpart = m.counterpart_of(sender).ok_or(MatchError::Unauthorized)?;

        let recorded = self.db().record_message(
            &message_id.to_string(),
            &match_id.to_string(),
            &sender.to_string(),
            body,
            &convert::format_ts(now),
        )?;

        let Some(count) = recorded else {
            // Redelivery: report the current count, emit nothing.
            return Ok(RecordOutcome {
                message_count: m.message_count,
                duplicate: true,
                notifications: vec![],
            });
        };

        let sender_label = self.sender_label(&m, sender)?;
        let notifications = vec![(
            counterpart,
            GatewayEvent::MessageCreate {
                id: message_id,
                match_id,
                sender_label,
                body: body.to_string(),
                message_count: count.max(0) as u64,
                timestamp: now,
            },
        )];

        Ok(RecordOutcome {
            message_count: count.max(0) as u64,
            duplicate: false,
            notifications,
        })
    }

    /// The match's conversation, labeled for one of its parties.
    pub fn conversation(
        &self,
        match_id: Uuid,
        viewer: Uuid,
        limit: u32,
    ) -> MatchResult<Vec<DeliveredMessage>> {
        let m = self.get_match_for(match_id, viewer)?;

        let rows = self.db().messages_for_match(&match_id.to_string(), limit)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let sender_id = convert::parse_uuid(&row.sender_id, "sender_id")?;
            out.push(DeliveredMessage {
                id: convert::parse_uuid(&row.id, "message id")?,
                sender_id,
                sender_label: self.sender_label(&m, sender_id)?,
                mine: sender_id == viewer,
                body: row.body,
                created_at: convert::parse_ts(&row.created_at, "created_at")?,
            });
        }
        Ok(out)
    }

    /// A party closes the match. Absorbing: the match never reactivates.
    pub fn end_match(
        &self,
        match_id: Uuid,
        ending_user: Uuid,
        reason: Option<&str>,
    ) -> MatchResult<EndOutcome> {
        let m = self.get_match_for(match_id, ending_user)?;

        if !self
            .db()
            .try_end_match(&match_id.to_string(), &ending_user.to_string(), reason)?
        {
            return Err(MatchError::MatchNotActive);
        }

        info!(match_id = %match_id, "match closed");
        let event = GatewayEvent::MatchEnded {
            match_id,
            reason: reason.map(str::to_string),
        };
        Ok(EndOutcome {
            match_id,
            notifications: vec![(m.party_a, event.clone()), (m.party_b, event)],
        })
    }

    /// Batch-expire active matches whose last activity predates the TTL.
    /// Each transition is conditional on `active`, so a racing close or
    /// reveal-era activity bump is never overwritten.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> MatchResult<ExpireOutcome> {
        let cutoff = convert::format_ts(now - self.config().match_ttl);
        let rows = self.db().stale_active_matches(&cutoff)?;

        let mut expired = Vec::new();
        let mut notifications = Vec::new();
        for row in rows {
            if !self.db().try_expire_match(&row.id)? {
                continue;
            }
            let m = convert::match_from_row(&row)?;
            info!(match_id = %m.id, "match expired after inactivity");
            expired.push(m.id);
            notifications.push((m.party_a, GatewayEvent::MatchExpired { match_id: m.id }));
            notifications.push((m.party_b, GatewayEvent::MatchExpired { match_id: m.id }));
        }

        Ok(ExpireOutcome {
            expired,
            notifications,
        })
    }

    /// How the sender shows up in a conversation event: pseudonym while
    /// masked, first name once mutually revealed.
    fn sender_label(&self, m: &AnonymousMatch, sender: Uuid) -> MatchResult<String> {
        if m.reveal_state().is_both_revealed() {
            let profile = self.profile_of(sender)?;
            if profile.first_name.is_empty() {
                Ok(profile.username)
            } else {
                Ok(profile.first_name)
            }
        } else {
            Ok(masking::pseudonym(m.id, sender))
        }
    }

    /// Stored profile, falling back to a stub built from the account row
    /// for users who never filled theirs in.
    pub(crate) fn profile_of(&self, user_id: Uuid) -> MatchResult<Profile> {
        let id = user_id.to_string();
        if let Some(row) = self.db().get_profile(&id)? {
            return convert::profile_from_row(&row);
        }

        let user = self
            .db()
            .get_user_by_id(&id)?
            .ok_or(MatchError::NotFound)?;
        Ok(Profile {
            user_id,
            first_name: String::new(),
            last_name: String::new(),
            username: user.username,
            age: None,
            gender: None,
            about: None,
            interests: vec![],
            profile_photo_url: None,
            location_city: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;
    use circle_db::models::MatchRow;
    use circle_db::Database;
    use circle_types::events::GatewayEvent;
    use circle_types::models::{MatchStatus, RevealState};
    use uuid::Uuid;

    use crate::{Coordinator, CoordinatorConfig, MatchError};

    struct Fixture {
        coordinator: Coordinator,
        match_id: Uuid,
        alice: Uuid,
        bob: Uuid,
    }

    fn fixture(message_count: i64, threshold: i64) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.create_user(&alice.to_string(), "alice", "hash-a").unwrap();
        db.create_user(&bob.to_string(), "bob", "hash-b").unwrap();
        db.upsert_profile(&circle_db::models::ProfileRow {
            user_id: alice.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Nguyen".to_string(),
            username: "alice".to_string(),
            age: Some(27),
            gender: None,
            about: None,
            interests: "[]".to_string(),
            profile_photo_url: Some("https://cdn.example/alice.jpg".to_string()),
            location_city: Some("Berlin".to_string()),
        })
        .unwrap();
        db.upsert_profile(&circle_db::models::ProfileRow {
            user_id: bob.to_string(),
            first_name: "Bob".to_string(),
            last_name: "Iyer".to_string(),
            username: "bob".to_string(),
            age: Some(30),
            gender: None,
            about: None,
            interests: "[]".to_string(),
            profile_photo_url: None,
            location_city: Some("Madrid".to_string()),
        })
        .unwrap();

        let match_id = Uuid::new_v4();
        let now = "2026-03-01T12:00:00Z".to_string();
        db.insert_match(&MatchRow {
            id: match_id.to_string(),
            party_a: alice.to_string(),
            party_b: bob.to_string(),
            message_count,
            reveal_threshold: threshold,
            a_revealed: false,
            b_revealed: false,
            status: "active".to_string(),
            version: 0,
            created_at: now.clone(),
            last_activity_at: now,
            ended_by: None,
            end_reason: None,
        })
        .unwrap();

        Fixture {
            coordinator: Coordinator::new(db, CoordinatorConfig::default()),
            match_id,
            alice,
            bob,
        }
    }

    fn both_revealed_events(notifications: &[(Uuid, GatewayEvent)]) -> usize {
        notifications
            .iter()
            .filter(|(_, e)| matches!(e, GatewayEvent::BothRevealed { .. }))
            .count()
    }

    #[test]
    fn threshold_not_met_leaves_state_unchanged() {
        let f = fixture(29, 30);

        let err = f.coordinator.request_reveal(f.match_id, f.alice).unwrap_err();
        match err {
            MatchError::ThresholdNotMet { remaining } => assert_eq!(remaining, 1),
            other => panic!("expected ThresholdNotMet, got {other:?}"),
        }

        let m = f.coordinator.get_match_for(f.match_id, f.alice).unwrap();
        assert_eq!(m.reveal_state(), RevealState::Hidden);
    }

    #[test]
    fn threshold_scenario_29_to_30() {
        let f = fixture(29, 30);

        // One more message crosses the threshold
        let rec = f
            .coordinator
            .record_message(f.match_id, Uuid::new_v4(), f.bob, "thirtieth", Utc::now())
            .unwrap();
        assert_eq!(rec.message_count, 30);

        let first = f.coordinator.request_reveal(f.match_id, f.alice).unwrap();
        assert_eq!(first.reveal_state, RevealState::PartyARevealed);
        assert!(!first.both_revealed);
        assert_eq!(both_revealed_events(&first.notifications), 0);
        // Requester gets the ack, counterpart the identity-free notice
        assert!(first.notifications.iter().any(|(to, e)| *to == f.alice
            && matches!(e, GatewayEvent::RevealPending { .. })));
        assert!(first.notifications.iter().any(|(to, e)| *to == f.bob
            && matches!(e, GatewayEvent::PartyRevealed { .. })));

        let second = f.coordinator.request_reveal(f.match_id, f.bob).unwrap();
        assert_eq!(second.reveal_state, RevealState::BothRevealed);
        assert!(second.both_revealed);
        assert_eq!(both_revealed_events(&second.notifications), 2);
    }

    #[test]
    fn reveal_is_monotonic_and_idempotent() {
        let f = fixture(40, 30);

        f.coordinator.request_reveal(f.match_id, f.alice).unwrap();
        let err = f.coordinator.request_reveal(f.match_id, f.alice).unwrap_err();
        assert!(matches!(err, MatchError::AlreadyRevealed));

        // The repeat attempt must not have unset or double-counted anything
        let m = f.coordinator.get_match_for(f.match_id, f.alice).unwrap();
        assert_eq!(m.reveal_state(), RevealState::PartyARevealed);
        assert!(m.a_revealed);
        assert!(!m.b_revealed);
    }

    #[test]
    fn no_second_both_revealed_pair() {
        let f = fixture(40, 30);

        f.coordinator.request_reveal(f.match_id, f.alice).unwrap();
        let done = f.coordinator.request_reveal(f.match_id, f.bob).unwrap();
        assert_eq!(both_revealed_events(&done.notifications), 2);

        // Any further attempt is AlreadyRevealed with no event fan-out
        let err = f.coordinator.request_reveal(f.match_id, f.bob).unwrap_err();
        assert!(matches!(err, MatchError::AlreadyRevealed));
    }

    #[test]
    fn masked_until_both_revealed() {
        let f = fixture(40, 30);

        // hidden: masked for both viewers
        let v = f.coordinator.masked_view(f.match_id, f.alice).unwrap();
        assert!(!v.is_revealed);
        assert!(v.username.is_none());

        // one-sided reveal: still masked for both viewers
        f.coordinator.request_reveal(f.match_id, f.alice).unwrap();
        let v = f.coordinator.masked_view(f.match_id, f.alice).unwrap();
        assert!(!v.is_revealed);
        let v = f.coordinator.masked_view(f.match_id, f.bob).unwrap();
        assert!(!v.is_revealed);
        assert!(v.profile_photo_url.is_none());

        // mutual reveal: unmasked for both viewers
        f.coordinator.request_reveal(f.match_id, f.bob).unwrap();
        let v = f.coordinator.masked_view(f.match_id, f.alice).unwrap();
        assert!(v.is_revealed);
        assert_eq!(v.display_name, "Bob Iyer");
        let v = f.coordinator.masked_view(f.match_id, f.bob).unwrap();
        assert_eq!(v.display_name, "Alice Nguyen");
        assert_eq!(v.profile_photo_url.as_deref(), Some("https://cdn.example/alice.jpg"));
    }

    #[test]
    fn masked_view_is_stable_across_calls() {
        let f = fixture(0, 30);
        let a = f.coordinator.masked_view(f.match_id, f.alice).unwrap();
        let b = f.coordinator.masked_view(f.match_id, f.alice).unwrap();
        assert_eq!(a.display_name, b.display_name);
        assert_eq!(a.anonymous_avatar, b.anonymous_avatar);
    }

    #[test]
    fn concurrent_reveals_converge_to_both_revealed() {
        for _ in 0..20 {
            let f = fixture(40, 30);
            let c1 = f.coordinator.clone();
            let c2 = f.coordinator.clone();
            let (m1, a) = (f.match_id, f.alice);
            let (m2, b) = (f.match_id, f.bob);

            let t1 = thread::spawn(move || c1.request_reveal(m1, a).unwrap());
            let t2 = thread::spawn(move || c2.request_reveal(m2, b).unwrap());
            let r1 = t1.join().unwrap();
            let r2 = t2.join().unwrap();

            // No lost update: the match always ends both_revealed, and
            // exactly one of the two calls produced the BothRevealed pair.
            let m = f.coordinator.get_match_for(f.match_id, f.alice).unwrap();
            assert_eq!(m.reveal_state(), RevealState::BothRevealed);

            let pairs = both_revealed_events(&r1.notifications)
                + both_revealed_events(&r2.notifications);
            assert_eq!(pairs, 2);
            assert!(r1.both_revealed ^ r2.both_revealed);
        }
    }

    #[test]
    fn record_message_deduplicates_by_id() {
        let f = fixture(0, 30);
        let message_id = Uuid::new_v4();

        let first = f
            .coordinator
            .record_message(f.match_id, message_id, f.alice, "hello", Utc::now())
            .unwrap();
        assert_eq!(first.message_count, 1);
        assert!(!first.duplicate);
        assert_eq!(first.notifications.len(), 1);

        let retry = f
            .coordinator
            .record_message(f.match_id, message_id, f.alice, "hello", Utc::now())
            .unwrap();
        assert!(retry.duplicate);
        assert_eq!(retry.message_count, 1);
        assert!(retry.notifications.is_empty());
    }

    #[test]
    fn message_events_use_pseudonyms_while_masked() {
        let f = fixture(0, 30);

        let rec = f
            .coordinator
            .record_message(f.match_id, Uuid::new_v4(), f.alice, "hi there", Utc::now())
            .unwrap();
        let (to, event) = &rec.notifications[0];
        assert_eq!(*to, f.bob);
        match event {
            GatewayEvent::MessageCreate { sender_label, .. } => {
                assert!(!sender_label.contains("Alice"));
            }
            other => panic!("expected MessageCreate, got {other:?}"),
        }
    }

    #[test]
    fn reveal_rejected_on_ended_match() {
        let f = fixture(40, 30);

        f.coordinator
            .end_match(f.match_id, f.bob, Some("not feeling it"))
            .unwrap();

        let err = f.coordinator.request_reveal(f.match_id, f.alice).unwrap_err();
        assert!(matches!(err, MatchError::MatchNotActive));

        // Ending twice is MatchNotActive too — closed is absorbing
        let err = f.coordinator.end_match(f.match_id, f.alice, None).unwrap_err();
        assert!(matches!(err, MatchError::MatchNotActive));
    }

    #[test]
    fn stale_matches_expire_and_reject_reveals() {
        let f = fixture(40, 30);
        let now = "2026-03-11T12:00:00Z".parse().unwrap(); // 10 days after fixture activity

        let outcome = f.coordinator.expire_stale(now).unwrap();
        assert_eq!(outcome.expired, vec![f.match_id]);
        assert_eq!(outcome.notifications.len(), 2);

        let err = f.coordinator.request_reveal(f.match_id, f.alice).unwrap_err();
        assert!(matches!(err, MatchError::MatchNotActive));
        let m = f.coordinator.get_match_for(f.match_id, f.alice).unwrap();
        assert_eq!(m.status, MatchStatus::Expired);

        // Second run finds nothing left to expire
        let outcome = f.coordinator.expire_stale(now).unwrap();
        assert!(outcome.expired.is_empty());
    }

    #[test]
    fn fresh_matches_survive_expiry() {
        let f = fixture(5, 30);
        let now = "2026-03-05T12:00:00Z".parse().unwrap(); // 4 days, TTL is 7
        let outcome = f.coordinator.expire_stale(now).unwrap();
        assert!(outcome.expired.is_empty());

        let m = f.coordinator.get_match_for(f.match_id, f.alice).unwrap();
        assert_eq!(m.status, MatchStatus::Active);
    }

    #[test]
    fn message_delivery_defers_expiry() {
        let f = fixture(5, 30);
        let sent_at = "2026-03-08T12:00:00Z".parse().unwrap();
        f.coordinator
            .record_message(f.match_id, Uuid::new_v4(), f.alice, "still here", sent_at)
            .unwrap();

        // 10 days after creation but only 3 after the last message
        let now = "2026-03-11T12:00:00Z".parse().unwrap();
        let outcome = f.coordinator.expire_stale(now).unwrap();
        assert!(outcome.expired.is_empty());
    }

    #[test]
    fn strangers_are_rejected() {
        let f = fixture(40, 30);
        let mallory = Uuid::new_v4();

        let err = f.coordinator.request_reveal(f.match_id, mallory).unwrap_err();
        assert!(matches!(err, MatchError::Unauthorized));
        let err = f.coordinator.masked_view(f.match_id, mallory).unwrap_err();
        assert!(matches!(err, MatchError::Unauthorized));

        let err = f
            .coordinator
            .request_reveal(Uuid::new_v4(), f.alice)
            .unwrap_err();
        assert!(matches!(err, MatchError::NotFound));
    }

    #[test]
    fn conversation_is_labeled_for_viewer() {
        let f = fixture(0, 30);
        f.coordinator
            .record_message(f.match_id, Uuid::new_v4(), f.alice, "first", Utc::now())
            .unwrap();
        f.coordinator
            .record_message(f.match_id, Uuid::new_v4(), f.bob, "second", Utc::now())
            .unwrap();

        let msgs = f.coordinator.conversation(f.match_id, f.alice, 50).unwrap();
        assert_eq!(msgs.len(), 2);
        for msg in &msgs {
            assert_eq!(msg.mine, msg.sender_id == f.alice);
            assert!(!msg.sender_label.contains("Alice"));
            assert!(!msg.sender_label.contains("Bob"));
        }
    }
}
