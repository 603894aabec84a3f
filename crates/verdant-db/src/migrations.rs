use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE friendships (
                requester_id  TEXT NOT NULL REFERENCES users(id),
                addressee_id  TEXT NOT NULL REFERENCES users(id),
                status        TEXT NOT NULL DEFAULT 'pending',
                created_at    TEXT NOT NULL,
                accepted_at   TEXT,
                PRIMARY KEY (requester_id, addressee_id)
            );

            CREATE INDEX idx_friendships_addressee
                ON friendships(addressee_id);

            -- Directed: owner_id treats friend_id as a close friend
            CREATE TABLE close_friends (
                owner_id    TEXT NOT NULL REFERENCES users(id),
                friend_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                PRIMARY KEY (owner_id, friend_id)
            );

            CREATE TABLE messages (
                id                    TEXT PRIMARY KEY,
                sender_id             TEXT NOT NULL REFERENCES users(id),
                recipient_id          TEXT NOT NULL REFERENCES users(id),
                message_type          TEXT NOT NULL,
                content               TEXT,
                media_url             TEXT,
                media_size            INTEGER,
                media_duration        REAL,
                disappear_after_secs  INTEGER,
                is_delivered          INTEGER NOT NULL DEFAULT 0,
                delivered_at          TEXT,
                is_viewed             INTEGER NOT NULL DEFAULT 0,
                viewed_at             TEXT,
                is_deleted            INTEGER NOT NULL DEFAULT 0,
                deleted_at            TEXT,
                expires_at            TEXT,
                created_at            TEXT NOT NULL
            );

            CREATE INDEX idx_messages_pair
                ON messages(sender_id, recipient_id, created_at);

            CREATE INDEX idx_messages_expiry
                ON messages(expires_at);

            CREATE TABLE stories (
                id             TEXT PRIMARY KEY,
                owner_id       TEXT NOT NULL REFERENCES users(id),
                content_type   TEXT NOT NULL,
                media_url      TEXT NOT NULL,
                media_size     INTEGER NOT NULL DEFAULT 0,
                duration_secs  REAL NOT NULL DEFAULT 0,
                caption        TEXT,
                privacy_level  TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                expires_at     TEXT NOT NULL,
                is_active      INTEGER NOT NULL DEFAULT 1,
                is_archived    INTEGER NOT NULL DEFAULT 0,
                archived_at    TEXT
            );

            CREATE INDEX idx_stories_owner
                ON stories(owner_id, created_at);

            -- Append-only. No uniqueness on (story_id, viewer_id).
            CREATE TABLE story_views (
                id          TEXT PRIMARY KEY,
                story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                viewer_id   TEXT NOT NULL REFERENCES users(id),
                viewed_at   TEXT NOT NULL
            );

            CREATE INDEX idx_story_views_story
                ON story_views(story_id, viewer_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (one friendship row per pair)");
        conn.execute_batch(
            "
            CREATE UNIQUE INDEX idx_friendships_pair
                ON friendships(min(requester_id, addressee_id), max(requester_id, addressee_id));

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
