use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `session` / `chatbot` tables (SPEC_FULL §3.1). Safe to
/// call on every startup — uses `IF NOT EXISTS` throughout, mirroring the
/// teacher's `init_db` convention.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id  INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS chatbot (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            role       TEXT NOT NULL CHECK (role IN ('USER', 'AGENT')),
            kind       TEXT NOT NULL CHECK (kind IN ('GENERATE', 'VOICE')),
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES session(id)
        );
        CREATE INDEX IF NOT EXISTS idx_chatbot_session
            ON chatbot(session_id, created_at);",
    )?;
    Ok(())
}
