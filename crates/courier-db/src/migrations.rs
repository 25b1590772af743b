use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name          TEXT NOT NULL,
                last_name           TEXT NOT NULL,
                email               TEXT NOT NULL UNIQUE,
                profile_image_url   TEXT,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id     INTEGER NOT NULL REFERENCES users(id),
                to_id       INTEGER NOT NULL REFERENCES users(id),
                text        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                delivered   INTEGER NOT NULL DEFAULT 0,
                read        INTEGER NOT NULL DEFAULT 0
            );

            -- replay lookup: undelivered messages for one recipient
            CREATE INDEX idx_messages_pending ON messages(to_id, delivered);

            -- unread counts and bulk mark-read per conversation direction
            CREATE INDEX idx_messages_unread ON messages(from_id, to_id, read);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
