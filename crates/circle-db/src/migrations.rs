use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS profiles (
            user_id             TEXT PRIMARY KEY REFERENCES users(id),
            first_name          TEXT NOT NULL DEFAULT '',
            last_name           TEXT NOT NULL DEFAULT '',
            username            TEXT NOT NULL DEFAULT '',
            age                 INTEGER,
            gender              TEXT,
            about               TEXT,
            interests           TEXT NOT NULL DEFAULT '[]',
            profile_photo_url   TEXT,
            location_city       TEXT
        );

        CREATE TABLE IF NOT EXISTS match_settings (
            user_id                     TEXT PRIMARY KEY REFERENCES users(id),
            is_enabled                  INTEGER NOT NULL DEFAULT 0,
            max_active_matches          INTEGER NOT NULL DEFAULT 3,
            preferred_reveal_threshold  INTEGER NOT NULL DEFAULT 30,
            auto_match                  INTEGER NOT NULL DEFAULT 0,
            notifications_enabled       INTEGER NOT NULL DEFAULT 1,
            last_match_at               TEXT
        );

        CREATE TABLE IF NOT EXISTS matches (
            id                  TEXT PRIMARY KEY,
            party_a             TEXT NOT NULL REFERENCES users(id),
            party_b             TEXT NOT NULL REFERENCES users(id),
            message_count       INTEGER NOT NULL DEFAULT 0,
            reveal_threshold    INTEGER NOT NULL,
            a_revealed          INTEGER NOT NULL DEFAULT 0,
            b_revealed          INTEGER NOT NULL DEFAULT 0,
            status              TEXT NOT NULL DEFAULT 'active',
            version             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            last_activity_at    TEXT NOT NULL,
            ended_by            TEXT,
            end_reason          TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_matches_party_a ON matches(party_a, status);
        CREATE INDEX IF NOT EXISTS idx_matches_party_b ON matches(party_b, status);
        CREATE INDEX IF NOT EXISTS idx_matches_activity ON matches(status, last_activity_at);

        -- Message id is the delivery idempotency key: re-inserting the
        -- same id is a no-op and must not bump message_count again.
        CREATE TABLE IF NOT EXISTS match_messages (
            id          TEXT PRIMARY KEY,
            match_id    TEXT NOT NULL REFERENCES matches(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_match_messages_match
            ON match_messages(match_id, created_at);

        CREATE TABLE IF NOT EXISTS help_requests (
            id                  TEXT PRIMARY KEY,
            requester_id        TEXT NOT NULL REFERENCES users(id),
            prompt              TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'searching',
            helper_id           TEXT,
            attempts_count      INTEGER NOT NULL DEFAULT 0,
            similarity_score    REAL,
            created_at          TEXT NOT NULL,
            matched_at          TEXT,
            expires_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_help_requests_status
            ON help_requests(status, expires_at);
        CREATE INDEX IF NOT EXISTS idx_help_requests_requester
            ON help_requests(requester_id, status);

        CREATE TABLE IF NOT EXISTS giver_profiles (
            user_id         TEXT PRIMARY KEY REFERENCES users(id),
            skills          TEXT NOT NULL DEFAULT '[]',
            categories      TEXT NOT NULL DEFAULT '[]',
            is_available    INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
