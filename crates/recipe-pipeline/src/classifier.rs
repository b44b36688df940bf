use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::gateway::{ChatMessage, ChatRequest, LlmGateway};

/// One of the four classification outcomes for a user utterance (§4.1).
/// Ambiguous classifier output defaults to `RecipeSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    RecipeSearch,
    RecipeModify,
    CookingQuestion,
    NotCooking,
}

const LABELS: [(&str, Intent); 4] = [
    ("RECIPE_SEARCH", Intent::RecipeSearch),
    ("RECIPE_MODIFY", Intent::RecipeModify),
    ("COOKING_QUESTION", Intent::CookingQuestion),
    ("NOT_COOKING", Intent::NotCooking),
];

/// Keywords signalling a recipe-modification utterance — shared with the
/// allergy/dislike short-circuit rule (§4.1, open question resolution) and
/// with modification-type classification (§3).
const MODIFICATION_KEYWORDS: &[&str] = &[
    "빼줘", "빼고", "빼", "말고", "대신", "바꿔", "교체", "넣어", "추가", "로 바꿔",
];

pub fn has_modification_keyword(utterance: &str) -> bool {
    MODIFICATION_KEYWORDS.iter().any(|k| utterance.contains(k))
}

const OFF_TOPIC_HINTS: &[&str] = &["날씨", "뉴스", "주식", "스포츠", "정치"];
const COOKING_QUESTION_HINTS: &[&str] = &["왜", "어떻게", "뭐가 다", "차이"];

fn prompt_for_intent(utterance: &str, history_has_recipe: bool) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "당신은 요리 어시스턴트의 의도 분류기입니다. 사용자의 발화를 다음 중 \
             정확히 하나의 라벨로만 답하세요: RECIPE_SEARCH, RECIPE_MODIFY, \
             COOKING_QUESTION, NOT_COOKING. 다른 말은 하지 마세요.",
        ),
        ChatMessage::user(format!(
            "최근 대화에 레시피가 있음: {}\n발화: {}",
            history_has_recipe, utterance
        )),
    ]
}

fn keyword_fallback(utterance: &str, history_has_recipe: bool) -> Intent {
    if history_has_recipe && has_modification_keyword(utterance) {
        return Intent::RecipeModify;
    }
    if OFF_TOPIC_HINTS.iter().any(|k| utterance.contains(k)) {
        return Intent::NotCooking;
    }
    if COOKING_QUESTION_HINTS.iter().any(|k| utterance.contains(k)) {
        return Intent::CookingQuestion;
    }
    Intent::RecipeSearch
}

/// A completion is treated the same as a transport failure (and falls back
/// to the keyword heuristic) when it is too short or names none of the
/// expected label tokens — a well-formed-but-implausible response
/// (SPEC_FULL §4.1 "Added").
fn response_is_plausible(text: &str) -> bool {
    text.trim().len() >= 4 && LABELS.iter().any(|(label, _)| text.contains(label))
}

pub struct IntentClassifier<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> IntentClassifier<'a> {
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    pub async fn classify(
        &self,
        utterance: &str,
        history_has_recipe: bool,
        cancel: &CancellationToken,
    ) -> Intent {
        let req = ChatRequest {
            messages: prompt_for_intent(utterance, history_has_recipe),
            temperature: 0.0,
            max_tokens: 16,
        };

        match self.llm.chat(req, cancel).await {
            Ok(resp) if response_is_plausible(&resp.content) => {
                parse_label(&resp.content).unwrap_or(Intent::RecipeSearch)
            }
            Ok(_) => {
                warn!("intent classifier returned an implausible completion, falling back");
                keyword_fallback(utterance, history_has_recipe)
            }
            Err(e) => {
                warn!(error = %e, "intent classifier transport failure, falling back");
                keyword_fallback(utterance, history_has_recipe)
            }
        }
    }
}

fn parse_label(text: &str) -> Option<Intent> {
    LABELS
        .iter()
        .find(|(label, _)| text.contains(label))
        .map(|(_, intent)| *intent)
}

/// What the Allergy/Dislike Declaration Detector found, if anything (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Allergy,
    Dislike,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub items: HashSet<String>,
}

pub struct AllergyDislikeDetector<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> AllergyDislikeDetector<'a> {
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    /// Invoked only when (a) the member is authenticated and (b) intent is
    /// neither RECIPE_SEARCH nor RECIPE_MODIFY — callers enforce that gate.
    /// Short-circuits to `None` when a prior recipe exists AND the
    /// utterance carries a modification keyword, per the stated precedence
    /// rule: this prevents "remove X" inside a recipe context from being
    /// misread as a dislike declaration.
    pub async fn detect(
        &self,
        utterance: &str,
        history_has_recipe: bool,
        cancel: &CancellationToken,
    ) -> Option<Declaration> {
        if history_has_recipe && has_modification_keyword(utterance) {
            return None;
        }

        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "사용자가 알레르기나 싫어하는 음식을 선언하고 있는지 판단하세요. \
                     형식: ALLERGY: 항목1,항목2 또는 DISLIKE: 항목1,항목2 또는 NONE.",
                ),
                ChatMessage::user(utterance.to_string()),
            ],
            temperature: 0.0,
            max_tokens: 64,
        };

        let resp = match self.llm.chat(req, cancel).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "declaration detector transport failure");
                return None;
            }
        };

        parse_declaration(&resp.content)
    }
}

/// Rejects a suspiciously short/unstructured completion (low content, no
/// expected keyword) rather than trusting a malformed response (SPEC_FULL
/// §4.1 quality gate).
fn parse_declaration(text: &str) -> Option<Declaration> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.len() < 4 {
        return None;
    }
    if trimmed.starts_with("NONE") {
        return None;
    }

    let (kind, rest) = if let Some(rest) = trimmed.strip_prefix("ALLERGY:") {
        (DeclarationKind::Allergy, rest)
    } else if let Some(rest) = trimmed.strip_prefix("DISLIKE:") {
        (DeclarationKind::Dislike, rest)
    } else {
        return None;
    };

    let items: HashSet<String> = rest
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        return None;
    }

    Some(Declaration { kind, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailingLlmGateway, ScriptedLlmGateway};

    #[tokio::test]
    async fn classifier_falls_back_to_search_on_transport_error() {
        let llm = FailingLlmGateway;
        let classifier = IntentClassifier::new(&llm);
        let intent = classifier
            .classify("당근 케이크 레시피", false, &CancellationToken::new())
            .await;
        assert_eq!(intent, Intent::RecipeSearch);
    }

    #[tokio::test]
    async fn classifier_parses_well_formed_label() {
        let llm = ScriptedLlmGateway::new(["NOT_COOKING"]);
        let classifier = IntentClassifier::new(&llm);
        let intent = classifier
            .classify("오늘 날씨 어때", false, &CancellationToken::new())
            .await;
        assert_eq!(intent, Intent::NotCooking);
    }

    #[tokio::test]
    async fn implausible_completion_falls_back_to_keyword_heuristic() {
        let llm = ScriptedLlmGateway::new(["ok"]);
        let classifier = IntentClassifier::new(&llm);
        let intent = classifier
            .classify("오늘 날씨 어때", false, &CancellationToken::new())
            .await;
        assert_eq!(intent, Intent::NotCooking);
    }

    #[tokio::test]
    async fn declaration_detector_short_circuits_when_recipe_and_modify_keyword_present() {
        let llm = ScriptedLlmGateway::new(["ALLERGY: 돼지고기"]);
        let detector = AllergyDislikeDetector::new(&llm);
        let result = detector
            .detect("돼지고기 빼줘", true, &CancellationToken::new())
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn declaration_detector_parses_dislike() {
        let llm = ScriptedLlmGateway::new(["DISLIKE: 당근, 오이"]);
        let detector = AllergyDislikeDetector::new(&llm);
        let result = detector
            .detect("난 당근이랑 오이를 싫어해", false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.kind, DeclarationKind::Dislike);
        assert!(result.items.contains("당근"));
    }

    #[test]
    fn modification_keyword_detection() {
        assert!(has_modification_keyword("돼지고기 빼줘"));
        assert!(has_modification_keyword("당근 말고 오이 넣어줘"));
        assert!(!has_modification_keyword("당근 케이크 레시피 알려줘"));
    }
}
