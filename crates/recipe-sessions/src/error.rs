use thiserror::Error;

/// Errors that can occur while managing per-connection dialog sessions or
/// the external chat-log store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("session not found: {0}")]
    NotFound(String),

    /// An internal invariant failure — e.g. an authenticated member with an
    /// empty personalization record. Surfaced to the client as an `error`
    /// frame; the session returns to IDLE.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
