use crate::models::{
    GiverProfileRow, HelpRequestRow, MatchMessageRow, MatchRow, MatchStatsRow, ProfileRow,
    SettingsRow, UserRow,
};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Profiles --

    pub fn upsert_profile(&self, p: &ProfileRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles
                    (user_id, first_name, last_name, username, age, gender, about,
                     interests, profile_photo_url, location_city)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(user_id) DO UPDATE SET
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    username = excluded.username,
                    age = excluded.age,
                    gender = excluded.gender,
                    about = excluded.about,
                    interests = excluded.interests,
                    profile_photo_url = excluded.profile_photo_url,
                    location_city = excluded.location_city",
                rusqlite::params![
                    p.user_id,
                    p.first_name,
                    p.last_name,
                    p.username,
                    p.age,
                    p.gender,
                    p.about,
                    p.interests,
                    p.profile_photo_url,
                    p.location_city
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, first_name, last_name, username, age, gender, about,
                        interests, profile_photo_url, location_city
                 FROM profiles WHERE user_id = ?1",
            )?;

            let row = stmt
                .query_row([user_id], |row| {
                    Ok(ProfileRow {
                        user_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        username: row.get(3)?,
                        age: row.get(4)?,
                        gender: row.get(5)?,
                        about: row.get(6)?,
                        interests: row.get(7)?,
                        profile_photo_url: row.get(8)?,
                        location_city: row.get(9)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    // -- Settings --

    pub fn get_settings(&self, user_id: &str) -> Result<Option<SettingsRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, is_enabled, max_active_matches, preferred_reveal_threshold,
                        auto_match, notifications_enabled, last_match_at
                 FROM match_settings WHERE user_id = ?1",
            )?;

            let row = stmt
                .query_row([user_id], |row| {
                    Ok(SettingsRow {
                        user_id: row.get(0)?,
                        is_enabled: row.get(1)?,
                        max_active_matches: row.get(2)?,
                        preferred_reveal_threshold: row.get(3)?,
                        auto_match: row.get(4)?,
                        notifications_enabled: row.get(5)?,
                        last_match_at: row.get(6)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    pub fn upsert_settings(&self, s: &SettingsRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO match_settings
                    (user_id, is_enabled, max_active_matches, preferred_reveal_threshold,
                     auto_match, notifications_enabled, last_match_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                    is_enabled = excluded.is_enabled,
                    max_active_matches = excluded.max_active_matches,
                    preferred_reveal_threshold = excluded.preferred_reveal_threshold,
                    auto_match = excluded.auto_match,
                    notifications_enabled = excluded.notifications_enabled,
                    last_match_at = excluded.last_match_at",
                rusqlite::params![
                    s.user_id,
                    s.is_enabled,
                    s.max_active_matches,
                    s.preferred_reveal_threshold,
                    s.auto_match,
                    s.notifications_enabled,
                    s.last_match_at
                ],
            )?;
            Ok(())
        })
    }

    /// User ids with blind dating enabled, oldest-matched first.
    pub fn enabled_user_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM match_settings WHERE is_enabled = 1
                 ORDER BY last_match_at IS NOT NULL, last_match_at",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    // -- Matches --

    pub fn insert_match(&self, m: &MatchRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO matches
                    (id, party_a, party_b, message_count, reveal_threshold,
                     a_revealed, b_revealed, status, version, created_at, last_activity_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    m.id,
                    m.party_a,
                    m.party_b,
                    m.message_count,
                    m.reveal_threshold,
                    m.a_revealed,
                    m.b_revealed,
                    m.status,
                    m.version,
                    m.created_at,
                    m.last_activity_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_match(&self, id: &str) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| query_match(conn, id))
    }

    pub fn matches_for_user(&self, user_id: &str) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE party_a = ?1 OR party_b = ?1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_match_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set one party's reveal flag, guarded by the version counter.
    /// Returns false when the row moved underneath us (version mismatch)
    /// or the match is no longer active — the caller re-reads and retries.
    pub fn try_set_reveal_flag(
        &self,
        id: &str,
        is_party_a: bool,
        expected_version: i64,
    ) -> Result<bool> {
        let column = if is_party_a { "a_revealed" } else { "b_revealed" };
        self.with_conn(|conn| {
            let n = conn.execute(
                &format!(
                    "UPDATE matches SET {column} = 1, version = version + 1
                     WHERE id = ?1 AND version = ?2 AND status = 'active'"
                ),
                rusqlite::params![id, expected_version],
            )?;
            Ok(n == 1)
        })
    }

    /// Record a delivered message and bump the counter, atomically and
    /// at most once per message id. Returns the new count, or None when
    /// the message id was already recorded (retry by the delivery layer).
    pub fn record_message(
        &self,
        message_id: &str,
        match_id: &str,
        sender_id: &str,
        body: &str,
        now: &str,
    ) -> Result<Option<i64>> {
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO match_messages (id, match_id, sender_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![message_id, match_id, sender_id, body, now],
            )?;

            if inserted == 0 {
                return Ok(None);
            }

            tx.execute(
                "UPDATE matches SET message_count = message_count + 1, last_activity_at = ?2
                 WHERE id = ?1",
                rusqlite::params![match_id, now],
            )?;

            let count: i64 = tx.query_row(
                "SELECT message_count FROM matches WHERE id = ?1",
                [match_id],
                |row| row.get(0),
            )?;

            Ok(Some(count))
        })
    }

    pub fn messages_for_match(&self, match_id: &str, limit: u32) -> Result<Vec<MatchMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, match_id, sender_id, body, created_at
                 FROM match_messages WHERE match_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![match_id, limit], |row| {
                    Ok(MatchMessageRow {
                        id: row.get(0)?,
                        match_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        body: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Close an active match. Conditional on `active` so expiry and a
    /// concurrent close cannot both win.
    pub fn try_end_match(&self, id: &str, ended_by: &str, reason: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE matches SET status = 'closed', ended_by = ?2, end_reason = ?3,
                        version = version + 1
                 WHERE id = ?1 AND status = 'active'",
                rusqlite::params![id, ended_by, reason],
            )?;
            Ok(n == 1)
        })
    }

    pub fn stale_active_matches(&self, cutoff: &str) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE status = 'active' AND last_activity_at < ?1"
            ))?;
            let rows = stmt
                .query_map([cutoff], map_match_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn try_expire_match(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE matches SET status = 'expired', version = version + 1
                 WHERE id = ?1 AND status = 'active'",
                [id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn active_match_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM matches
                 WHERE status = 'active' AND (party_a = ?1 OR party_b = ?1)",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Whether the pair has ever been matched, in any status. Former
    /// matches are never re-paired.
    pub fn match_exists_between(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM matches
                 WHERE (party_a = ?1 AND party_b = ?2) OR (party_a = ?2 AND party_b = ?1)",
                [a, b],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn match_stats(&self, user_id: &str) -> Result<MatchStatsRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "SELECT COUNT(*),
                        SUM(status = 'active'),
                        SUM(a_revealed = 1 AND b_revealed = 1),
                        SUM(status != 'active')
                 FROM matches WHERE party_a = ?1 OR party_b = ?1",
                [user_id],
                |row| {
                    Ok(MatchStatsRow {
                        total: row.get(0)?,
                        active: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        revealed: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        ended: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    })
                },
            )?;
            Ok(row)
        })
    }

    // -- Help requests --

    pub fn insert_help_request(&self, r: &HelpRequestRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO help_requests
                    (id, requester_id, prompt, status, helper_id, attempts_count,
                     similarity_score, created_at, matched_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    r.id,
                    r.requester_id,
                    r.prompt,
                    r.status,
                    r.helper_id,
                    r.attempts_count,
                    r.similarity_score,
                    r.created_at,
                    r.matched_at,
                    r.expires_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_help_request(&self, id: &str) -> Result<Option<HelpRequestRow>> {
        self.with_conn(|conn| query_help_request(conn, id))
    }

    /// The requester's open request, if any (searching or matched).
    pub fn open_help_request_for(&self, requester_id: &str) -> Result<Option<HelpRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HELP_COLUMNS} FROM help_requests
                 WHERE requester_id = ?1 AND status IN ('searching', 'matched')
                 ORDER BY created_at DESC LIMIT 1"
            ))?;
            let row = stmt.query_row([requester_id], map_help_row).optional()?;
            Ok(row)
        })
    }

    /// Claim a searching request for a helper. Conditional on `searching`
    /// so two concurrent acceptors resolve to exactly one winner.
    pub fn try_accept_help_request(&self, id: &str, helper_id: &str, now: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE help_requests SET status = 'matched', helper_id = ?2, matched_at = ?3
                 WHERE id = ?1 AND status = 'searching'",
                rusqlite::params![id, helper_id, now],
            )?;
            Ok(n == 1)
        })
    }

    /// A helper declined or timed out. Returns the new attempt count, or
    /// None when the request is no longer searching.
    pub fn bump_help_attempts(&self, id: &str) -> Result<Option<i64>> {
        self.with_tx(|tx| {
            let n = tx.execute(
                "UPDATE help_requests SET attempts_count = attempts_count + 1
                 WHERE id = ?1 AND status = 'searching'",
                [id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let count: i64 = tx.query_row(
                "SELECT attempts_count FROM help_requests WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(Some(count))
        })
    }

    pub fn try_cancel_help_request(&self, id: &str, requester_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE help_requests SET status = 'cancelled'
                 WHERE id = ?1 AND requester_id = ?2 AND status = 'searching'",
                rusqlite::params![id, requester_id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn try_complete_help_request(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE help_requests SET status = 'completed'
                 WHERE id = ?1 AND status = 'matched'",
                [id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn try_expire_help_request(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE help_requests SET status = 'expired'
                 WHERE id = ?1 AND status = 'searching'",
                [id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn overdue_help_requests(&self, now: &str) -> Result<Vec<HelpRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HELP_COLUMNS} FROM help_requests
                 WHERE status = 'searching' AND expires_at < ?1"
            ))?;
            let rows = stmt
                .query_map([now], map_help_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_help_requests(
        &self,
        status: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HelpRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HELP_COLUMNS} FROM help_requests
                 WHERE status = ?1
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![status, limit, offset], map_help_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Giver profiles --

    pub fn upsert_giver_profile(&self, g: &GiverProfileRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO giver_profiles (user_id, skills, categories, is_available)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    skills = excluded.skills,
                    categories = excluded.categories,
                    is_available = excluded.is_available",
                rusqlite::params![g.user_id, g.skills, g.categories, g.is_available],
            )?;
            Ok(())
        })
    }

    pub fn set_giver_availability(&self, user_id: &str, is_available: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO giver_profiles (user_id, is_available) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET is_available = excluded.is_available",
                rusqlite::params![user_id, is_available],
            )?;
            Ok(())
        })
    }

    pub fn get_giver_profile(&self, user_id: &str) -> Result<Option<GiverProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, skills, categories, is_available
                 FROM giver_profiles WHERE user_id = ?1",
            )?;
            let row = stmt
                .query_row([user_id], |row| {
                    Ok(GiverProfileRow {
                        user_id: row.get(0)?,
                        skills: row.get(1)?,
                        categories: row.get(2)?,
                        is_available: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }
}

const MATCH_COLUMNS: &str = "id, party_a, party_b, message_count, reveal_threshold, \
     a_revealed, b_revealed, status, version, created_at, last_activity_at, \
     ended_by, end_reason";

fn map_match_row(row: &rusqlite::Row<'_>) -> std::result::Result<MatchRow, rusqlite::Error> {
    Ok(MatchRow {
        id: row.get(0)?,
        party_a: row.get(1)?,
        party_b: row.get(2)?,
        message_count: row.get(3)?,
        reveal_threshold: row.get(4)?,
        a_revealed: row.get(5)?,
        b_revealed: row.get(6)?,
        status: row.get(7)?,
        version: row.get(8)?,
        created_at: row.get(9)?,
        last_activity_at: row.get(10)?,
        ended_by: row.get(11)?,
        end_reason: row.get(12)?,
    })
}

fn query_match(conn: &Connection, id: &str) -> Result<Option<MatchRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"))?;
    let row = stmt.query_row([id], map_match_row).optional()?;
    Ok(row)
}

const HELP_COLUMNS: &str = "id, requester_id, prompt, status, helper_id, attempts_count, \
     similarity_score, created_at, matched_at, expires_at";

fn map_help_row(row: &rusqlite::Row<'_>) -> std::result::Result<HelpRequestRow, rusqlite::Error> {
    Ok(HelpRequestRow {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        prompt: row.get(2)?,
        status: row.get(3)?,
        helper_id: row.get(4)?,
        attempts_count: row.get(5)?,
        similarity_score: row.get(6)?,
        created_at: row.get(7)?,
        matched_at: row.get(8)?,
        expires_at: row.get(9)?,
    })
}

fn query_help_request(conn: &Connection, id: &str) -> Result<Option<HelpRequestRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {HELP_COLUMNS} FROM help_requests WHERE id = ?1"))?;
    let row = stmt.query_row([id], map_help_row).optional()?;
    Ok(row)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{HelpRequestRow, MatchRow};
    use crate::Database;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("user-a", "alice", "hash-a").unwrap();
        db.create_user("user-b", "bob", "hash-b").unwrap();
        db
    }

    fn test_match(id: &str) -> MatchRow {
        MatchRow {
            id: id.to_string(),
            party_a: "user-a".to_string(),
            party_b: "user-b".to_string(),
            message_count: 0,
            reveal_threshold: 30,
            a_revealed: false,
            b_revealed: false,
            status: "active".to_string(),
            version: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_activity_at: "2026-01-01T00:00:00Z".to_string(),
            ended_by: None,
            end_reason: None,
        }
    }

    #[test]
    fn reveal_flag_update_is_version_guarded() {
        let db = test_db();
        db.insert_match(&test_match("m1")).unwrap();

        assert!(db.try_set_reveal_flag("m1", true, 0).unwrap());
        // Same version again: the row moved, update must not apply
        assert!(!db.try_set_reveal_flag("m1", false, 0).unwrap());
        assert!(db.try_set_reveal_flag("m1", false, 1).unwrap());

        let m = db.get_match("m1").unwrap().unwrap();
        assert!(m.a_revealed);
        assert!(m.b_revealed);
        assert_eq!(m.version, 2);
    }

    #[test]
    fn record_message_is_idempotent_per_id() {
        let db = test_db();
        db.insert_match(&test_match("m1")).unwrap();

        let first = db
            .record_message("msg-1", "m1", "user-a", "hi", "2026-01-02T00:00:00Z")
            .unwrap();
        assert_eq!(first, Some(1));

        // Redelivery of the same message id must not double count
        let dup = db
            .record_message("msg-1", "m1", "user-a", "hi", "2026-01-02T00:00:01Z")
            .unwrap();
        assert_eq!(dup, None);

        let m = db.get_match("m1").unwrap().unwrap();
        assert_eq!(m.message_count, 1);
        assert_eq!(m.last_activity_at, "2026-01-02T00:00:00Z");
    }

    #[test]
    fn expire_only_touches_stale_active_rows() {
        let db = test_db();
        let mut stale = test_match("m-stale");
        stale.last_activity_at = "2026-01-01T00:00:00Z".to_string();
        db.insert_match(&stale).unwrap();

        let mut fresh = test_match("m-fresh");
        fresh.last_activity_at = "2026-02-01T00:00:00Z".to_string();
        db.insert_match(&fresh).unwrap();

        let rows = db.stale_active_matches("2026-01-15T00:00:00Z").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "m-stale");

        assert!(db.try_expire_match("m-stale").unwrap());
        // Already expired: second transition must not apply
        assert!(!db.try_expire_match("m-stale").unwrap());
    }

    #[test]
    fn help_request_accept_is_single_winner() {
        let db = test_db();
        db.create_user("helper-1", "carol", "hash-c").unwrap();
        db.create_user("helper-2", "dave", "hash-d").unwrap();
        db.insert_help_request(&HelpRequestRow {
            id: "hr-1".to_string(),
            requester_id: "user-a".to_string(),
            prompt: "need advice".to_string(),
            status: "searching".to_string(),
            helper_id: None,
            attempts_count: 0,
            similarity_score: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            matched_at: None,
            expires_at: "2026-01-01T01:00:00Z".to_string(),
        })
        .unwrap();

        assert!(db
            .try_accept_help_request("hr-1", "helper-1", "2026-01-01T00:10:00Z")
            .unwrap());
        assert!(!db
            .try_accept_help_request("hr-1", "helper-2", "2026-01-01T00:10:01Z")
            .unwrap());

        let r = db.get_help_request("hr-1").unwrap().unwrap();
        assert_eq!(r.status, "matched");
        assert_eq!(r.helper_id.as_deref(), Some("helper-1"));
    }
}
