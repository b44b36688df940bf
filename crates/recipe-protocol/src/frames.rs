use serde::{Deserialize, Serialize};

/// How a single modification-ledger entry was classified.
///
/// Classification precedence (see the dialog controller): replace wins when
/// both replace- and add-phrasing are present in one utterance, remove wins
/// over a lone add, and `modify` is the catch-all when neither keyword class
/// matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationType {
    Remove,
    Replace,
    Add,
    Modify,
}

/// One entry in a session's append-only modification ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationEntry {
    pub request: String,
    #[serde(rename = "type")]
    pub kind: ModificationType,
    #[serde(default)]
    pub remove_ingredients: Vec<String>,
    #[serde(default)]
    pub add_ingredients: Vec<String>,
    pub timestamp: String,
}

/// A single turn in the replayed conversation history sent with `init_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Personalization snapshot supplied once at session init.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemberInfo {
    #[serde(default)]
    pub member_id: Option<i64>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
    #[serde(default)]
    pub utensils: Vec<String>,
}

/// A yes/no answer to a suspended constraint confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    Yes,
    No,
}

impl Confirmation {
    pub fn is_yes(self) -> bool {
        matches!(self, Confirmation::Yes)
    }
}

/// Client → server frames. Tagged directly on `type`; the wire contract is a
/// closed, fully-named set, so there is no generic req/res envelope here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    InitContext {
        member_info: MemberInfo,
        #[serde(default)]
        initial_history: Vec<HistoryTurn>,
        #[serde(default)]
        modification_history: Vec<ModificationEntry>,
    },
    UserMessage {
        content: String,
    },
    ConstraintConfirmation {
        confirmation: Confirmation,
    },
    AllergyConfirmation {
        confirmation: Confirmation,
    },
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    SessionInitialized {
        session_id: String,
        db_session_id: Option<i64>,
    },
    Thinking {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Progress {
        message: String,
        elapsed_secs: f64,
    },
    AgentMessage {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
        #[serde(rename = "hideImage", skip_serializing_if = "Option::is_none")]
        hide_image: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        modification_history: Option<Vec<ModificationEntry>>,
    },
    ChatExternal {
        content: String,
    },
    /// Despite the name, this is the soft dislike-confirmation prompt, not the
    /// hard allergy block — the hard block is a plain `AgentMessage`. Naming
    /// kept as-is to match the wire contract.
    AllergyWarning {
        content: String,
        matched_dislikes: Vec<String>,
        show_confirmation: bool,
    },
    ConstraintWarning {
        content: String,
        conflicted_ingredients: Vec<String>,
        show_confirmation: bool,
    },
    AllergyDislikeDetected {
        content: String,
        detected_type: String,
        detected_items: Vec<String>,
        show_button: bool,
    },
    Error {
        message: String,
    },
}

impl OutboundFrame {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundFrame::Error {
            message: message.into(),
        }
    }
}
