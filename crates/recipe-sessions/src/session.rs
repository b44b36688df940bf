use std::collections::HashSet;

use recipe_core::{Document, SessionId};
use recipe_protocol::{HistoryTurn, ModificationEntry};

use crate::personalization::Personalization;

/// The outer state machine's current mode for one session (§4.7).
/// `Classified*` variants are transient — the controller passes through them
/// within a single `user_message` handling and never parks there between
/// frames, so they are not represented as a separate enum here; only the
/// states a session can be *waiting* in between inbound frames are modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Idle,
    AwaitingDislikeConfirmation,
    AwaitingLedgerConfirmation,
    PipelineRunning,
}

/// A suspended search awaiting explicit user approval of a soft constraint
/// violation. Modeled as a single two-variant optional rather than two
/// independent booleans so invariant I6 (never both pending at once) holds
/// at the type level — a session can literally not represent "both pending".
#[derive(Debug, Clone)]
pub enum PendingConfirmation {
    Dislike {
        query: String,
        matched_dislikes: HashSet<String>,
    },
    Ledger {
        query: String,
        conflicted_ingredients: HashSet<String>,
    },
}

/// Per-connection dialog session. Owned by the channel handler task and
/// mutated only there — no locks, no cross-task sharing (§5, §9).
#[derive(Debug, Clone)]
pub struct DialogSession {
    pub session_id: SessionId,
    pub db_session_id: Option<i64>,
    pub personalization: Option<Personalization>,
    pub message_log: Vec<HistoryTurn>,
    pub modification_ledger: Vec<ModificationEntry>,
    pub temporarily_allowed_dislikes: HashSet<String>,
    pub pending: Option<PendingConfirmation>,
    pub last_documents: Vec<Document>,
    pub last_assistant_response: Option<String>,
    pub state: DialogState,
}

impl DialogSession {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            db_session_id: None,
            personalization: None,
            message_log: Vec::new(),
            modification_ledger: Vec::new(),
            temporarily_allowed_dislikes: HashSet::new(),
            pending: None,
            last_documents: Vec::new(),
            last_assistant_response: None,
            state: DialogState::Idle,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.personalization.is_some()
    }

    pub fn push_turn(&mut self, role: &str, content: impl Into<String>, image: Option<String>) {
        self.message_log.push(HistoryTurn {
            role: role.to_string(),
            content: content.into(),
            image,
        });
    }

    /// Append a confirmed modification to the ledger. I2 (ledger
    /// monotonicity): callers must call this exactly once per accepted
    /// modification turn.
    pub fn append_modification(&mut self, entry: ModificationEntry) {
        self.modification_ledger.push(entry);
    }

    /// Mark a name as permanently allowed for the rest of this session's
    /// lifetime (I7). Never removed once added.
    pub fn allow_dislike_temporarily(&mut self, names: impl IntoIterator<Item = String>) {
        self.temporarily_allowed_dislikes.extend(names);
    }

    /// Clear whatever pending confirmation is set, if any. Must be called
    /// before any further processing of the session once a confirmation
    /// frame has been handled (§3 invariants).
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Detects whether the recent assistant history contains a recipe, by
    /// the structural marker the Post-Processor emits: an ingredient
    /// section (`재료:`) plus the per-recipe metadata glyph line.
    pub fn recent_history_has_recipe(&self) -> bool {
        self.message_log
            .iter()
            .rev()
            .take(6)
            .filter(|t| t.role == "assistant")
            .any(|t| contains_recipe_markers(&t.content))
    }

    /// Find the most recent assistant turn containing a recipe, newest
    /// first, as the Modification Path's prior-recipe lookup requires
    /// (§4.5).
    pub fn find_prior_recipe(&self) -> Option<&HistoryTurn> {
        self.message_log
            .iter()
            .rev()
            .filter(|t| t.role == "assistant")
            .find(|t| contains_recipe_markers(&t.content))
    }
}

fn contains_recipe_markers(text: &str) -> bool {
    text.contains("재료:") && (text.contains('⏱') || text.contains('📊') || text.contains('👥'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_idle_with_no_pending() {
        let s = DialogSession::new(SessionId::new());
        assert_eq!(s.state, DialogState::Idle);
        assert!(s.pending.is_none());
    }

    #[test]
    fn recipe_marker_detection_requires_both_ingredient_header_and_glyph() {
        let mut s = DialogSession::new(SessionId::new());
        s.push_turn("assistant", "그냥 텍스트입니다", None);
        assert!(!s.recent_history_has_recipe());
        s.push_turn(
            "assistant",
            "제육볶음\n⏱️ 20분 | 📊 쉬움 | 👥 2인분\n맛있는 제육볶음이에요.\n재료: 돼지고기 300g, 양파 1개",
            None,
        );
        assert!(s.recent_history_has_recipe());
    }

    #[test]
    fn temporarily_allowed_is_append_only() {
        let mut s = DialogSession::new(SessionId::new());
        s.allow_dislike_temporarily(["당근".to_string()]);
        assert!(s.temporarily_allowed_dislikes.contains("당근"));
        s.clear_pending();
        assert!(s.temporarily_allowed_dislikes.contains("당근"));
    }
}
