//! Pairing, per-user settings, and aggregate stats.
//!
//! Pairing here is eligibility filtering only — compatibility scoring is
//! an external concern. A candidate is eligible when both sides have
//! blind dating enabled, are under their own active-match caps, and have
//! never been matched with each other before.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use circle_db::models::{MatchRow, SettingsRow};
use circle_types::events::GatewayEvent;
use circle_types::models::{
    AnonymousMatch, MatchSettings, MatchStats, MAX_REVEAL_THRESHOLD, MIN_REVEAL_THRESHOLD,
};

use crate::convert;
use crate::{Coordinator, MatchResult, Notifications};

#[derive(Debug)]
pub enum FindMatchOutcome {
    Created {
        created: AnonymousMatch,
        notifications: Notifications,
    },
    /// The caller has blind dating switched off.
    Disabled,
    /// The caller is already at their active-match cap.
    AtCapacity,
    /// Nobody eligible right now.
    NoCandidates,
}

#[derive(Debug, Default)]
pub struct SettingsPatch {
    pub is_enabled: Option<bool>,
    pub max_active_matches: Option<u32>,
    pub preferred_reveal_threshold: Option<u64>,
    pub auto_match: Option<bool>,
    pub notifications_enabled: Option<bool>,
}

impl Coordinator {
    /// The user's settings, defaults when they never touched them.
    pub fn settings_of(&self, user: Uuid) -> MatchResult<MatchSettings> {
        match self.db().get_settings(&user.to_string())? {
            Some(row) => convert::settings_from_row(&row),
            None => Ok(MatchSettings::defaults(user)),
        }
    }

    /// Apply a partial settings update. The reveal threshold is clamped
    /// to its allowed range rather than rejected, matching the slider in
    /// the client.
    pub fn update_settings(&self, user: Uuid, patch: SettingsPatch) -> MatchResult<MatchSettings> {
        let mut settings = self.settings_of(user)?;

        if let Some(v) = patch.is_enabled {
            settings.is_enabled = v;
        }
        if let Some(v) = patch.max_active_matches {
            settings.max_active_matches = v.max(1);
        }
        if let Some(v) = patch.preferred_reveal_threshold {
            settings.preferred_reveal_threshold = v.clamp(MIN_REVEAL_THRESHOLD, MAX_REVEAL_THRESHOLD);
        }
        if let Some(v) = patch.auto_match {
            settings.auto_match = v;
        }
        if let Some(v) = patch.notifications_enabled {
            settings.notifications_enabled = v;
        }

        self.persist_settings(&settings)?;
        Ok(settings)
    }

    pub fn set_enabled(&self, user: Uuid, enabled: bool) -> MatchResult<MatchSettings> {
        self.update_settings(
            user,
            SettingsPatch {
                is_enabled: Some(enabled),
                ..SettingsPatch::default()
            },
        )
    }

    /// Pair the caller with the first eligible candidate.
    pub fn find_match(&self, user: Uuid, now: DateTime<Utc>) -> MatchResult<FindMatchOutcome> {
        let settings = self.settings_of(user)?;
        if !settings.is_enabled {
            return Ok(FindMatchOutcome::Disabled);
        }
        if self.db().active_match_count(&user.to_string())? >= settings.max_active_matches as i64 {
            return Ok(FindMatchOutcome::AtCapacity);
        }

        let user_str = user.to_string();
        for candidate_id in self.db().enabled_user_ids()? {
            if candidate_id == user_str {
                continue;
            }
            if self.db().match_exists_between(&user_str, &candidate_id)? {
                continue;
            }

            let candidate = convert::parse_uuid(&candidate_id, "candidate user id")?;
            let candidate_settings = self.settings_of(candidate)?;
            if self.db().active_match_count(&candidate_id)?
                >= candidate_settings.max_active_matches as i64
            {
                continue;
            }

            let created =
                self.create_match(user, &settings, candidate, &candidate_settings, now)?;
            let notifications = vec![
                (
                    user,
                    GatewayEvent::MatchCreated {
                        match_id: created.id,
                        reveal_threshold: created.reveal_threshold,
                        counterpart: self.masked_counterpart(&created, user)?,
                    },
                ),
                (
                    candidate,
                    GatewayEvent::MatchCreated {
                        match_id: created.id,
                        reveal_threshold: created.reveal_threshold,
                        counterpart: self.masked_counterpart(&created, candidate)?,
                    },
                ),
            ];
            return Ok(FindMatchOutcome::Created {
                created,
                notifications,
            });
        }

        Ok(FindMatchOutcome::NoCandidates)
    }

    pub fn matches_for(&self, user: Uuid) -> MatchResult<Vec<AnonymousMatch>> {
        let rows = self.db().matches_for_user(&user.to_string())?;
        rows.iter().map(convert::match_from_row).collect()
    }

    pub fn stats_for(&self, user: Uuid) -> MatchResult<MatchStats> {
        let row = self.db().match_stats(&user.to_string())?;
        let total = row.total.max(0) as u64;
        let revealed = row.revealed.max(0) as u64;
        Ok(MatchStats {
            total_matches: total,
            active_matches: row.active.max(0) as u64,
            revealed_matches: revealed,
            ended_matches: row.ended.max(0) as u64,
            success_rate: if total == 0 {
                0.0
            } else {
                revealed as f64 / total as f64
            },
        })
    }

    fn create_match(
        &self,
        user: Uuid,
        user_settings: &MatchSettings,
        candidate: Uuid,
        candidate_settings: &MatchSettings,
        now: DateTime<Utc>,
    ) -> MatchResult<AnonymousMatch> {
        // Mutual consent: the more conservative threshold preference wins,
        // and the value is frozen into the match at creation.
        let threshold = user_settings
            .preferred_reveal_threshold
            .max(candidate_settings.preferred_reveal_threshold)
            .clamp(MIN_REVEAL_THRESHOLD, MAX_REVEAL_THRESHOLD);

        let now_str = convert::format_ts(now);
        let row = MatchRow {
            id: Uuid::new_v4().to_string(),
            party_a: user.to_string(),
            party_b: candidate.to_string(),
            message_count: 0,
            reveal_threshold: threshold as i64,
            a_revealed: false,
            b_revealed: false,
            status: "active".to_string(),
            version: 0,
            created_at: now_str.clone(),
            last_activity_at: now_str,
            ended_by: None,
            end_reason: None,
        };
        self.db().insert_match(&row)?;

        for side in [user_settings, candidate_settings] {
            let mut updated = side.clone();
            updated.last_match_at = Some(now);
            self.persist_settings(&updated)?;
        }

        info!(match_id = %row.id, "anonymous match created");
        convert::match_from_row(&row)
    }

    fn persist_settings(&self, settings: &MatchSettings) -> MatchResult<()> {
        self.db().upsert_settings(&SettingsRow {
            user_id: settings.user_id.to_string(),
            is_enabled: settings.is_enabled,
            max_active_matches: settings.max_active_matches as i64,
            preferred_reveal_threshold: settings.preferred_reveal_threshold as i64,
            auto_match: settings.auto_match,
            notifications_enabled: settings.notifications_enabled,
            last_match_at: settings.last_match_at.map(convert::format_ts),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use circle_db::Database;
    use uuid::Uuid;

    use crate::matchmaker::{FindMatchOutcome, SettingsPatch};
    use crate::{Coordinator, CoordinatorConfig};

    fn coordinator() -> Coordinator {
        Coordinator::new(
            Arc::new(Database::open_in_memory().unwrap()),
            CoordinatorConfig::default(),
        )
    }

    fn add_user(c: &Coordinator, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        c.db().create_user(&id.to_string(), name, "hash").unwrap();
        id
    }

    fn enable(c: &Coordinator, user: Uuid, threshold: u64) {
        c.update_settings(
            user,
            SettingsPatch {
                is_enabled: Some(true),
                preferred_reveal_threshold: Some(threshold),
                ..SettingsPatch::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn settings_default_and_clamp() {
        let c = coordinator();
        let user = add_user(&c, "alice");

        let defaults = c.settings_of(user).unwrap();
        assert!(!defaults.is_enabled);
        assert_eq!(defaults.preferred_reveal_threshold, 30);

        let s = c
            .update_settings(
                user,
                SettingsPatch {
                    preferred_reveal_threshold: Some(7),
                    ..SettingsPatch::default()
                },
            )
            .unwrap();
        assert_eq!(s.preferred_reveal_threshold, 10);

        let s = c
            .update_settings(
                user,
                SettingsPatch {
                    preferred_reveal_threshold: Some(500),
                    max_active_matches: Some(0),
                    ..SettingsPatch::default()
                },
            )
            .unwrap();
        assert_eq!(s.preferred_reveal_threshold, 100);
        assert_eq!(s.max_active_matches, 1);
    }

    #[test]
    fn find_match_requires_enabled() {
        let c = coordinator();
        let alice = add_user(&c, "alice");
        let bob = add_user(&c, "bob");
        enable(&c, bob, 30);

        assert!(matches!(
            c.find_match(alice, Utc::now()).unwrap(),
            FindMatchOutcome::Disabled
        ));
    }

    #[test]
    fn find_match_pairs_with_conservative_threshold() {
        let c = coordinator();
        let alice = add_user(&c, "alice");
        let bob = add_user(&c, "bob");
        enable(&c, alice, 20);
        enable(&c, bob, 60);

        let outcome = c.find_match(alice, Utc::now()).unwrap();
        let FindMatchOutcome::Created {
            created,
            notifications,
        } = outcome
        else {
            panic!("expected a created match");
        };

        assert_eq!(created.reveal_threshold, 60);
        assert_eq!(created.counterpart_of(alice), Some(bob));
        // Both parties are told, each seeing the other masked
        assert_eq!(notifications.len(), 2);

        let alice_settings = c.settings_of(alice).unwrap();
        assert!(alice_settings.last_match_at.is_some());
    }

    #[test]
    fn pairs_are_never_rematched() {
        let c = coordinator();
        let alice = add_user(&c, "alice");
        let bob = add_user(&c, "bob");
        enable(&c, alice, 30);
        enable(&c, bob, 30);

        let FindMatchOutcome::Created { created, .. } = c.find_match(alice, Utc::now()).unwrap()
        else {
            panic!("expected a created match");
        };

        // Even after the match ends, the same pair is not eligible again
        c.end_match(created.id, alice, None).unwrap();
        assert!(matches!(
            c.find_match(alice, Utc::now()).unwrap(),
            FindMatchOutcome::NoCandidates
        ));
    }

    #[test]
    fn capacity_blocks_both_sides() {
        let c = coordinator();
        let alice = add_user(&c, "alice");
        let bob = add_user(&c, "bob");
        let carol = add_user(&c, "carol");
        enable(&c, alice, 30);
        enable(&c, bob, 30);
        enable(&c, carol, 30);
        c.update_settings(
            alice,
            SettingsPatch {
                max_active_matches: Some(1),
                ..SettingsPatch::default()
            },
        )
        .unwrap();

        let FindMatchOutcome::Created { .. } = c.find_match(alice, Utc::now()).unwrap() else {
            panic!("expected a created match");
        };

        // Alice is now full
        assert!(matches!(
            c.find_match(alice, Utc::now()).unwrap(),
            FindMatchOutcome::AtCapacity
        ));
    }

    #[test]
    fn stats_count_reveals_as_success() {
        let c = coordinator();
        let alice = add_user(&c, "alice");
        let bob = add_user(&c, "bob");
        enable(&c, alice, 30);
        enable(&c, bob, 30);

        let FindMatchOutcome::Created { created, .. } = c.find_match(alice, Utc::now()).unwrap()
        else {
            panic!("expected a created match");
        };

        for _ in 0..30 {
            c.record_message(created.id, Uuid::new_v4(), alice, "hey", Utc::now())
                .unwrap();
        }
        c.request_reveal(created.id, alice).unwrap();
        c.request_reveal(created.id, bob).unwrap();

        let stats = c.stats_for(alice).unwrap();
        assert_eq!(stats.total_matches, 1);
        assert_eq!(stats.active_matches, 1);
        assert_eq!(stats.revealed_matches, 1);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }
}
