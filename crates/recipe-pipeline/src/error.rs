use thiserror::Error;

/// Transport/parse failures talking to the completion service. Every
/// failure here is recovered locally by the caller (keyword fallback,
/// pass-through, etc.) — `LlmError` never itself reaches the wire.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed completion: {0}")]
    MalformedResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum WebSearchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Errors the Dialog Controller surfaces directly as a wire `error` frame
/// (category 5 in the error-handling design: internal invariant failure).
/// Transport/timeout/protocol-violation categories never construct this —
/// they're handled as fallbacks, timeout frames, or silently-ignored
/// protocol violations respectively.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("session error: {0}")]
    Session(#[from] recipe_sessions::SessionError),
}
