use std::collections::HashSet;

use recipe_protocol::ModificationType;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::classifier::has_modification_keyword;
use crate::gateway::{ChatMessage, ChatRequest, LlmGateway};

/// Replacement phrasing ("말고/대신/바꿔/교체") combined with addition
/// phrasing ("넣어/추가/로") → replace; removal phrasing alone → remove;
/// addition phrasing alone → add; else modify. Order matters: replace is
/// checked before remove before add (§3, preserved from `router.py`).
const REPLACE_HINTS: &[&str] = &["말고", "대신", "바꿔", "교체"];
const ADD_HINTS: &[&str] = &["넣어", "추가", "로"];
const REMOVE_HINTS: &[&str] = &["빼줘", "빼고", "빼", "제외"];

pub fn classify_modification_type(utterance: &str) -> ModificationType {
    let has_replace = REPLACE_HINTS.iter().any(|k| utterance.contains(k));
    let has_add = ADD_HINTS.iter().any(|k| utterance.contains(k));
    let has_remove = REMOVE_HINTS.iter().any(|k| utterance.contains(k));

    if has_replace && has_add {
        ModificationType::Replace
    } else if has_remove {
        ModificationType::Remove
    } else if has_add {
        ModificationType::Add
    } else {
        ModificationType::Modify
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedIngredients {
    pub remove: HashSet<String>,
    pub add: HashSet<String>,
}

/// Common typo substitutions tried before giving up on the regex fallback
/// (SPEC_FULL §4.2 "Added", carried from the original's typo table).
const TYPO_PAIRS: &[(&str, &str)] = &[("뺴", "빼"), ("말구", "말고"), ("대시", "대신")];

fn normalize_typos(s: &str) -> String {
    let mut out = s.to_string();
    for (typo, correct) in TYPO_PAIRS {
        out = out.replace(typo, correct);
    }
    out
}

/// Non-ingredient location/filler nouns the regex fallback must not treat
/// as ingredients (e.g. "여기서 빼줘" naming a place, not a food item).
const EXCLUSION_LIST: &[&str] = &["여기", "거기", "이거", "그거", "전부", "다"];

fn regex_fallback(utterance: &str, kind: ModificationType) -> ExtractedIngredients {
    let normalized = normalize_typos(utterance);
    let mut out = ExtractedIngredients::default();

    let token_re = Regex::new(r"([가-힣A-Za-z]{2,})\s*(말고|대신|빼줘|빼고|빼|제외|넣어|추가)")
        .expect("static regex is valid");

    for caps in token_re.captures_iter(&normalized) {
        let token = caps[1].to_string();
        let keyword = &caps[2];
        if EXCLUSION_LIST.contains(&token.as_str()) || token.chars().count() < 2 {
            continue;
        }
        match keyword {
            "말고" | "대신" => out.remove.insert(token),
            "빼줘" | "빼고" | "빼" | "제외" => out.remove.insert(token),
            "넣어" | "추가" => out.add.insert(token),
            _ => false,
        };
    }

    if kind == ModificationType::Replace && out.remove.is_empty() && out.add.is_empty() {
        // "A 말고 B 넣어줘" with only one keyword matched — best-effort split
        // on the replace hint itself.
        for hint in REPLACE_HINTS {
            if let Some((before, after)) = normalized.split_once(hint) {
                if let Some(r) = last_token(before) {
                    out.remove.insert(r);
                }
                if let Some(a) = first_token(after) {
                    out.add.insert(a);
                }
                break;
            }
        }
    }

    out
}

fn last_token(s: &str) -> Option<String> {
    s.split_whitespace()
        .last()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && !('가'..='힣').contains(&c)))
        .filter(|t| t.chars().count() >= 2)
        .map(String::from)
}

fn first_token(s: &str) -> Option<String> {
    s.split_whitespace()
        .find(|t| !ADD_HINTS.iter().any(|h| t.contains(h)))
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && !('가'..='힣').contains(&c)))
        .filter(|t| t.chars().count() >= 2)
        .map(String::from)
}

pub struct IngredientExtractor<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> IngredientExtractor<'a> {
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    pub async fn extract(
        &self,
        utterance: &str,
        kind: ModificationType,
        cancel: &CancellationToken,
    ) -> ExtractedIngredients {
        let prompt = match kind {
            ModificationType::Replace => format!(
                "\"{}\" 에서 빼려는 재료와 새로 넣으려는 재료를 각각 알려주세요. \
                 형식: REMOVE: 재료 / ADD: 재료",
                utterance
            ),
            _ => format!(
                "\"{}\" 에서 언급된 재료 이름만 알려주세요. 형식: ITEMS: 재료1,재료2",
                utterance
            ),
        };

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: 0.0,
            max_tokens: 64,
        };

        match self.llm.chat(req, cancel).await {
            Ok(resp) => {
                let parsed = parse_extraction(&resp.content, kind);
                if parsed.remove.is_empty() && parsed.add.is_empty() {
                    regex_fallback(utterance, kind)
                } else {
                    parsed
                }
            }
            Err(e) => {
                warn!(error = %e, "ingredient extractor transport failure, using regex fallback");
                regex_fallback(utterance, kind)
            }
        }
    }
}

fn parse_extraction(text: &str, kind: ModificationType) -> ExtractedIngredients {
    let mut out = ExtractedIngredients::default();

    if let Some(idx) = text.find("REMOVE:") {
        let rest = &text[idx + "REMOVE:".len()..];
        let segment = rest.split("ADD:").next().unwrap_or(rest);
        out.remove = split_items(segment);
    }
    if let Some(idx) = text.find("ADD:") {
        let rest = &text[idx + "ADD:".len()..];
        out.add = split_items(rest);
    }
    if let Some(idx) = text.find("ITEMS:") {
        let rest = &text[idx + "ITEMS:".len()..];
        let items = split_items(rest);
        match kind {
            ModificationType::Add => out.add = items,
            _ => out.remove = items,
        }
    }

    out
}

fn split_items(s: &str) -> HashSet<String> {
    s.lines()
        .next()
        .unwrap_or("")
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailingLlmGateway, ScriptedLlmGateway};

    #[test]
    fn replace_precedes_remove_precedes_add() {
        assert_eq!(
            classify_modification_type("돼지고기 말고 참치 넣어줘"),
            ModificationType::Replace
        );
        assert_eq!(
            classify_modification_type("돼지고기 빼줘"),
            ModificationType::Remove
        );
        assert_eq!(
            classify_modification_type("고추 추가해줘"),
            ModificationType::Add
        );
        assert_eq!(
            classify_modification_type("더 맵게 해줘"),
            ModificationType::Modify
        );
    }

    #[tokio::test]
    async fn llm_extraction_parses_replace_both_sides() {
        let llm = ScriptedLlmGateway::new(["REMOVE: 돼지고기\nADD: 참치"]);
        let extractor = IngredientExtractor::new(&llm);
        let out = extractor
            .extract(
                "돼지고기 말고 참치 넣어줘",
                ModificationType::Replace,
                &CancellationToken::new(),
            )
            .await;
        assert!(out.remove.contains("돼지고기"));
        assert!(out.add.contains("참치"));
    }

    #[tokio::test]
    async fn falls_back_to_regex_on_transport_failure() {
        let llm = FailingLlmGateway;
        let extractor = IngredientExtractor::new(&llm);
        let out = extractor
            .extract("돼지고기 빼줘", ModificationType::Remove, &CancellationToken::new())
            .await;
        assert!(out.remove.contains("돼지고기"));
    }

    #[test]
    fn regex_fallback_tolerates_common_typo() {
        let out = regex_fallback("돼지고기 뺴줘", ModificationType::Remove);
        assert!(out.remove.contains("돼지고기"));
    }

    #[test]
    fn regex_fallback_excludes_location_nouns() {
        let out = regex_fallback("여기 말고 저기로 해줘", ModificationType::Modify);
        assert!(!out.remove.contains("여기"));
    }

    #[test]
    fn extracted_tokens_must_be_at_least_two_characters() {
        let items = split_items("기,돼지고기");
        assert!(!items.contains("기"));
        assert!(items.contains("돼지고기"));
    }
}
