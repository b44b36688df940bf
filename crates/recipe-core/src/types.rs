use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies the member a session belongs to. Absent for an unauthenticated
/// guest session — in that case constraint checks that require personalization
/// are skipped rather than treated as a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection session identifier (random UUID, not persisted across restarts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Token accounting for a single LLM call, normalized at the gateway boundary
/// so no downstream component branches on provider-specific usage shapes
/// (input/output/total, prompt/completion/total, or no usage block at all).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub const ZERO: TokenUsage = TokenUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    };

    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Opaque retrieval output. Never mutated by the dialog core — only read for
/// constraint marking, relevance grading, and generation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub recipe_id: Option<String>,
    /// Set by the Constraint Marker stage when `content` mentions a
    /// personalization-constrained ingredient; empty otherwise.
    #[serde(default)]
    pub constraint_warning: String,
}

/// Identifies one of the Pipeline Executor's measured stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Rewrite,
    Retrieve,
    CheckConstraints,
    GradeRelevance,
    WebSearch,
    Generate,
    Extract,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageName::Rewrite => "rewrite",
            StageName::Retrieve => "retrieve",
            StageName::CheckConstraints => "check_constraints",
            StageName::GradeRelevance => "grade_relevance",
            StageName::WebSearch => "web_search",
            StageName::Generate => "generate",
            StageName::Extract => "extract",
        };
        f.write_str(s)
    }
}
