use std::sync::Mutex;

use rusqlite::Connection;
use tracing::instrument;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Agent,
}

impl ChatRole {
    fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "USER",
            ChatRole::Agent => "AGENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Generate,
    Voice,
}

impl ChatKind {
    fn as_str(self) -> &'static str {
        match self {
            ChatKind::Generate => "GENERATE",
            ChatKind::Voice => "VOICE",
        }
    }
}

/// Append-only writer for the external `session`/`chatbot` store (SPEC_FULL
/// §3.1). No core control-flow decision reads these rows back — the core
/// references this only to record chat turns.
pub trait ChatLogStore: Send + Sync {
    /// Create a new `session` row, returning its persisted id.
    fn create_session(&self, member_id: Option<i64>) -> Result<i64>;

    /// Append one `chatbot` turn to an existing session.
    fn append_turn(
        &self,
        db_session_id: i64,
        role: ChatRole,
        kind: ChatKind,
        content: &str,
    ) -> Result<()>;
}

/// SQLite-backed implementation, selected by config (mirrors the teacher's
/// `rusqlite`-backed session manager: a single connection behind a `Mutex`,
/// sufficient for a single-node deployment).
pub struct SqliteChatLogStore {
    db: Mutex<Connection>,
}

impl SqliteChatLogStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }
}

impl ChatLogStore for SqliteChatLogStore {
    #[instrument(skip(self))]
    fn create_session(&self, member_id: Option<i64>) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO session (member_id, created_at) VALUES (?1, ?2)",
            rusqlite::params![member_id, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    #[instrument(skip(self, content))]
    fn append_turn(
        &self,
        db_session_id: i64,
        role: ChatRole,
        kind: ChatKind,
        content: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chatbot (session_id, role, kind, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![db_session_id, role.as_str(), kind.as_str(), content, now],
        )?;
        Ok(())
    }
}

/// No-op implementation for tests and for deployments that don't wire a
/// database — recording chat turns is ambient logging, not control flow.
#[derive(Default)]
pub struct NoopChatLogStore;

impl ChatLogStore for NoopChatLogStore {
    fn create_session(&self, _member_id: Option<i64>) -> Result<i64> {
        Ok(0)
    }

    fn append_turn(
        &self,
        _db_session_id: i64,
        _role: ChatRole,
        _kind: ChatKind,
        _content: &str,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_round_trips_a_session_and_turn() {
        let conn = Connection::open_in_memory().unwrap();
        let store = SqliteChatLogStore::new(conn).unwrap();
        let id = store.create_session(Some(7)).unwrap();
        store
            .append_turn(id, ChatRole::User, ChatKind::Generate, "당근 케이크")
            .unwrap();
        store
            .append_turn(id, ChatRole::Agent, ChatKind::Generate, "재료: 당근 2개")
            .unwrap();
    }

    #[test]
    fn noop_store_never_errors() {
        let store = NoopChatLogStore;
        let id = store.create_session(None).unwrap();
        store
            .append_turn(id, ChatRole::User, ChatKind::Generate, "hi")
            .unwrap();
    }
}
