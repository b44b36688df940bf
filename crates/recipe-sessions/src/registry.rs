use dashmap::DashMap;
use recipe_core::SessionId;
use tokio_util::sync::CancellationToken;

/// Process-wide "active sessions" registry (§5): a concurrent mapping from
/// session id to that session's cancellation token. Insertions happen on
/// channel open, removals on close. This is the *only* state the registry
/// holds — the session's domain state (`DialogSession`) stays owned by its
/// connection task, never published here.
#[derive(Default)]
pub struct SessionRegistry {
    tokens: DashMap<SessionId, CancellationToken>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Register a freshly opened session, returning the token its pipeline
    /// runs should be bound to.
    pub fn insert(&self, id: SessionId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(id, token.clone());
        token
    }

    /// Cancel and drop a session's entry on disconnect.
    pub fn remove(&self, id: &SessionId) {
        if let Some((_, token)) = self.tokens.remove(id) {
            token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_cancels_the_token() {
        let reg = SessionRegistry::new();
        let id = SessionId::new();
        let token = reg.insert(id.clone());
        assert!(!token.is_cancelled());
        reg.remove(&id);
        assert!(token.is_cancelled());
    }

    #[test]
    fn len_tracks_open_sessions() {
        let reg = SessionRegistry::new();
        assert!(reg.is_empty());
        let id = SessionId::new();
        reg.insert(id.clone());
        assert_eq!(reg.len(), 1);
        reg.remove(&id);
        assert_eq!(reg.len(), 0);
    }
}
