//! Anonymous help-request lifecycle.
//!
//! `searching -> matched -> completed`, with `expired` and `cancelled` as
//! the other exits. Accepting is a conditional claim on the `searching`
//! status, so two givers racing for the same request resolve to exactly
//! one winner. Declines count helper attempts; the attempt cap and the
//! request timeout both land in `expired`.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use circle_db::models::{GiverProfileRow, HelpRequestRow};
use circle_types::events::GatewayEvent;
use circle_types::models::{GiverProfile, HelpRequest, HelpRequestStatus};

use crate::convert;
use crate::{Coordinator, MatchError, MatchResult, Notifications};

#[derive(Debug)]
pub struct RespondOutcome {
    pub request: HelpRequest,
    pub notifications: Notifications,
}

#[derive(Debug)]
pub struct HelpExpiryOutcome {
    pub expired: Vec<Uuid>,
    pub notifications: Notifications,
}

impl Coordinator {
    /// Open a new help request for a receiver. One open request per user.
    pub fn create_help_request(
        &self,
        requester: Uuid,
        prompt: &str,
        now: DateTime<Utc>,
    ) -> MatchResult<HelpRequest> {
        if self
            .db()
            .open_help_request_for(&requester.to_string())?
            .is_some()
        {
            return Err(MatchError::RequestAlreadyOpen);
        }

        let row = HelpRequestRow {
            id: Uuid::new_v4().to_string(),
            requester_id: requester.to_string(),
            prompt: prompt.to_string(),
            status: "searching".to_string(),
            helper_id: None,
            attempts_count: 0,
            similarity_score: None,
            created_at: convert::format_ts(now),
            matched_at: None,
            expires_at: convert::format_ts(now + self.config().help_request_timeout),
        };
        self.db().insert_help_request(&row)?;
        info!(request_id = %row.id, "help request opened");
        convert::help_request_from_row(&row)
    }

    pub fn get_help_request(&self, request_id: Uuid, caller: Uuid) -> MatchResult<HelpRequest> {
        let row = self
            .db()
            .get_help_request(&request_id.to_string())?
            .ok_or(MatchError::NotFound)?;
        let request = convert::help_request_from_row(&row)?;
        if request.requester_id != caller && request.helper_id != Some(caller) {
            return Err(MatchError::Unauthorized);
        }
        Ok(request)
    }

    /// The caller's open request, if any.
    pub fn active_help_request(&self, requester: Uuid) -> MatchResult<Option<HelpRequest>> {
        match self.db().open_help_request_for(&requester.to_string())? {
            Some(row) => Ok(Some(convert::help_request_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Searching requests shown to givers. Requester identity stays out
    /// of the giver-facing view — they see the prompt, not the person.
    pub fn list_open_help_requests(&self, limit: u32, offset: u32) -> MatchResult<Vec<HelpRequest>> {
        let rows = self.db().list_help_requests(
            HelpRequestStatus::Searching.as_str(),
            limit,
            offset,
        )?;
        rows.iter().map(convert::help_request_from_row).collect()
    }

    /// A giver accepts or declines a request they were offered.
    pub fn respond_to_help_request(
        &self,
        request_id: Uuid,
        helper: Uuid,
        accepted: bool,
        now: DateTime<Utc>,
    ) -> MatchResult<RespondOutcome> {
        let id = request_id.to_string();
        let row = self.db().get_help_request(&id)?.ok_or(MatchError::NotFound)?;
        let request = convert::help_request_from_row(&row)?;
        if request.requester_id == helper {
            return Err(MatchError::Unauthorized);
        }

        if accepted {
            if !self
                .db()
                .try_accept_help_request(&id, &helper.to_string(), &convert::format_ts(now))?
            {
                return Err(MatchError::RequestNotOpen);
            }
            info!(request_id = %request_id, "help request accepted");

            let request = self.reload_help_request(&id)?;
            let notifications = vec![(
                request.requester_id,
                GatewayEvent::HelpRequestMatched { request_id },
            )];
            return Ok(RespondOutcome {
                request,
                notifications,
            });
        }

        // Decline: bump the attempt counter; exhausting it expires the
        // request the same way a timeout would.
        let Some(attempts) = self.db().bump_help_attempts(&id)? else {
            return Err(MatchError::RequestNotOpen);
        };

        let mut notifications = Vec::new();
        if attempts >= self.config().help_attempt_cap as i64
            && self.db().try_expire_help_request(&id)?
        {
            info!(request_id = %request_id, attempts, "help request exhausted its helpers");
            notifications.push((
                request.requester_id,
                GatewayEvent::HelpRequestExpired { request_id },
            ));
        }

        Ok(RespondOutcome {
            request: self.reload_help_request(&id)?,
            notifications,
        })
    }

    pub fn cancel_help_request(&self, request_id: Uuid, requester: Uuid) -> MatchResult<HelpRequest> {
        let id = request_id.to_string();
        if !self.db().try_cancel_help_request(&id, &requester.to_string())? {
            // Distinguish "not yours / gone" from "already past searching"
            let row = self.db().get_help_request(&id)?.ok_or(MatchError::NotFound)?;
            let request = convert::help_request_from_row(&row)?;
            if request.requester_id != requester {
                return Err(MatchError::Unauthorized);
            }
            return Err(MatchError::RequestNotOpen);
        }
        self.reload_help_request(&id)
    }

    /// Either side marks a matched session done.
    pub fn complete_help_request(&self, request_id: Uuid, caller: Uuid) -> MatchResult<HelpRequest> {
        let request = self.get_help_request(request_id, caller)?;
        if !self.db().try_complete_help_request(&request.id.to_string())? {
            return Err(MatchError::RequestNotOpen);
        }
        info!(request_id = %request_id, "help request completed");
        self.reload_help_request(&request_id.to_string())
    }

    /// Batch-expire searching requests past their deadline.
    pub fn expire_help_requests(&self, now: DateTime<Utc>) -> MatchResult<HelpExpiryOutcome> {
        let rows = self.db().overdue_help_requests(&convert::format_ts(now))?;

        let mut expired = Vec::new();
        let mut notifications = Vec::new();
        for row in rows {
            if !self.db().try_expire_help_request(&row.id)? {
                continue;
            }
            let request = convert::help_request_from_row(&row)?;
            info!(request_id = %request.id, "help request timed out");
            expired.push(request.id);
            notifications.push((
                request.requester_id,
                GatewayEvent::HelpRequestExpired {
                    request_id: request.id,
                },
            ));
        }

        Ok(HelpExpiryOutcome {
            expired,
            notifications,
        })
    }

    // -- Giver profiles --

    pub fn setup_giver_profile(
        &self,
        user: Uuid,
        skills: Vec<String>,
        categories: Vec<String>,
    ) -> MatchResult<GiverProfile> {
        let row = GiverProfileRow {
            user_id: user.to_string(),
            skills: serde_json::to_string(&skills).map_err(anyhow::Error::from)?,
            categories: serde_json::to_string(&categories).map_err(anyhow::Error::from)?,
            is_available: self
                .db()
                .get_giver_profile(&user.to_string())?
                .map(|g| g.is_available)
                .unwrap_or(false),
        };
        self.db().upsert_giver_profile(&row)?;
        Ok(GiverProfile {
            user_id: user,
            skills,
            categories,
            is_available: row.is_available,
        })
    }

    pub fn set_giver_availability(&self, user: Uuid, is_available: bool) -> MatchResult<GiverProfile> {
        self.db()
            .set_giver_availability(&user.to_string(), is_available)?;
        self.giver_profile(user)
    }

    pub fn giver_profile(&self, user: Uuid) -> MatchResult<GiverProfile> {
        match self.db().get_giver_profile(&user.to_string())? {
            Some(row) => Ok(GiverProfile {
                user_id: user,
                skills: serde_json::from_str(&row.skills).unwrap_or_default(),
                categories: serde_json::from_str(&row.categories).unwrap_or_default(),
                is_available: row.is_available,
            }),
            None => Ok(GiverProfile {
                user_id: user,
                skills: vec![],
                categories: vec![],
                is_available: false,
            }),
        }
    }

    fn reload_help_request(&self, id: &str) -> MatchResult<HelpRequest> {
        let row = self.db().get_help_request(id)?.ok_or(MatchError::NotFound)?;
        convert::help_request_from_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{Duration, Utc};
    use circle_db::Database;
    use circle_types::models::HelpRequestStatus;
    use uuid::Uuid;

    use crate::{Coordinator, CoordinatorConfig, MatchError};

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

    #[test]
    fn one_open_request_per_user() {
        let c = coordinator();
        let requester = add_user(&c, "rae");

        c.create_help_request(requester, "need meal prep tips", Utc::now())
            .unwrap();
        let err = c
            .create_help_request(requester, "another one", Utc::now())
            .unwrap_err();
        assert!(matches!(err, MatchError::RequestAlreadyOpen));
    }

    #[test]
    fn accept_moves_to_matched_and_notifies_requester() {
        let c = coordinator();
        let requester = add_user(&c, "rae");
        let helper = add_user(&c, "hank");

        let request = c
            .create_help_request(requester, "apartment hunting advice", Utc::now())
            .unwrap();
        let outcome = c
            .respond_to_help_request(request.id, helper, true, Utc::now())
            .unwrap();

        assert_eq!(outcome.request.status, HelpRequestStatus::Matched);
        assert_eq!(outcome.request.helper_id, Some(helper));
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].0, requester);
    }

    #[test]
    fn concurrent_accepts_have_one_winner() {
        for _ in 0..10 {
            let c = coordinator();
            let requester = add_user(&c, "rae");
            let h1 = add_user(&c, "hank");
            let h2 = add_user(&c, "hope");

            let request = c
                .create_help_request(requester, "study partner", Utc::now())
                .unwrap();

            let (c1, c2) = (c.clone(), c.clone());
            let id = request.id;
            let t1 = thread::spawn(move || c1.respond_to_help_request(id, h1, true, Utc::now()));
            let t2 = thread::spawn(move || c2.respond_to_help_request(id, h2, true, Utc::now()));
            let results = [t1.join().unwrap(), t2.join().unwrap()];

            let winners = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(winners, 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(MatchError::RequestNotOpen))));
        }
    }

    #[test]
    fn declines_exhaust_into_expired() {
        let c = coordinator();
        let requester = add_user(&c, "rae");
        let request = c
            .create_help_request(requester, "gym buddy", Utc::now())
            .unwrap();

        // Cap is 5: four declines keep it searching
        for i in 0..4 {
            let name = format!("helper-{i}");
            let helper = add_user(&c, &name);
            let outcome = c
                .respond_to_help_request(request.id, helper, false, Utc::now())
                .unwrap();
            assert_eq!(outcome.request.status, HelpRequestStatus::Searching);
            assert!(outcome.notifications.is_empty());
        }

        let last = add_user(&c, "helper-last");
        let outcome = c
            .respond_to_help_request(request.id, last, false, Utc::now())
            .unwrap();
        assert_eq!(outcome.request.status, HelpRequestStatus::Expired);
        assert_eq!(outcome.request.attempts_count, 5);
        assert_eq!(outcome.notifications.len(), 1);

        // Late accept finds the request closed
        let late = add_user(&c, "late");
        let err = c
            .respond_to_help_request(request.id, late, true, Utc::now())
            .unwrap_err();
        assert!(matches!(err, MatchError::RequestNotOpen));
    }

    #[test]
    fn requester_cannot_help_themselves() {
        let c = coordinator();
        let requester = add_user(&c, "rae");
        let request = c
            .create_help_request(requester, "moving boxes", Utc::now())
            .unwrap();

        let err = c
            .respond_to_help_request(request.id, requester, true, Utc::now())
            .unwrap_err();
        assert!(matches!(err, MatchError::Unauthorized));
    }

    #[test]
    fn cancel_and_complete_transitions() {
        let c = coordinator();
        let requester = add_user(&c, "rae");
        let helper = add_user(&c, "hank");

        let request = c
            .create_help_request(requester, "resume review", Utc::now())
            .unwrap();

        // Only the requester may cancel
        let err = c.cancel_help_request(request.id, helper).unwrap_err();
        assert!(matches!(err, MatchError::Unauthorized));

        let cancelled = c.cancel_help_request(request.id, requester).unwrap();
        assert_eq!(cancelled.status, HelpRequestStatus::Cancelled);

        // A fresh request can go all the way to completed
        let request = c
            .create_help_request(requester, "resume review again", Utc::now())
            .unwrap();
        c.respond_to_help_request(request.id, helper, true, Utc::now())
            .unwrap();
        let done = c.complete_help_request(request.id, helper).unwrap();
        assert_eq!(done.status, HelpRequestStatus::Completed);

        // Completed is terminal
        let err = c.complete_help_request(request.id, requester).unwrap_err();
        assert!(matches!(err, MatchError::RequestNotOpen));
    }

    #[test]
    fn timeout_expires_searching_requests() {
        let c = coordinator();
        let requester = add_user(&c, "rae");
        let created_at = Utc::now();
        let request = c
            .create_help_request(requester, "plant care", created_at)
            .unwrap();

        // Before the deadline nothing happens
        let outcome = c
            .expire_help_requests(created_at + Duration::minutes(10))
            .unwrap();
        assert!(outcome.expired.is_empty());

        let outcome = c
            .expire_help_requests(created_at + Duration::minutes(31))
            .unwrap();
        assert_eq!(outcome.expired, vec![request.id]);
        assert_eq!(outcome.notifications.len(), 1);

        let reloaded = c.get_help_request(request.id, requester).unwrap();
        assert_eq!(reloaded.status, HelpRequestStatus::Expired);
    }

    #[test]
    fn giver_profile_roundtrip() {
        let c = coordinator();
        let giver = add_user(&c, "hank");

        let profile = c
            .setup_giver_profile(
                giver,
                vec!["cooking".to_string()],
                vec!["lifestyle".to_string()],
            )
            .unwrap();
        assert!(!profile.is_available);

        let profile = c.set_giver_availability(giver, true).unwrap();
        assert!(profile.is_available);
        assert_eq!(profile.skills, vec!["cooking".to_string()]);
    }
}
