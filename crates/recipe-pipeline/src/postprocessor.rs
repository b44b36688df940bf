//! Canonicalizes generated recipe text (§4.6). Rules are expressed as
//! ordered, pure transformations over text — strip procedure → strip
//! safety lines → normalize intro → normalize ingredients — so each can be
//! property-tested in isolation (§9).

use std::sync::OnceLock;

use regex::Regex;

/// Vague-quantity vocabulary an ingredient entry must not contain (SPEC_FULL
/// §2.2, carried verbatim from the original's exclusion list).
const VAGUE_QUANTITY_TOKENS: &[&str] = &[
    "약간", "적당량", "조금", "넉넉히", "충분히", "적절히", "취향껏", "소량", "다량",
];

/// Korean measurement units recognized alongside a bare digit as "has a
/// quantity" (SPEC_FULL §2.2).
const UNIT_TOKENS: &[&str] = &[
    "스푼", "작은술", "큰술", "컵", "개", "대", "ml", "g", "kg", "L", "방울", "꼬집",
];

/// Informal suffixes / emoji stripped from the intro block.
const INFORMAL_SUFFIXES: &[&str] = &["이에요~", "해요~", "였답니다", "랍니다", "이랍니다"];

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{1F300}-\u{1FAFF}\u{2600}-\u{27BF}]").expect("static regex"))
}

fn numbered_step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\s*[.)]\s*\S").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("static regex"))
}

/// Strip any procedure section beginning at a numbered-step marker or the
/// localized "조리법" keyword (I5).
fn strip_procedure(text: &str) -> String {
    let cut_at_keyword = text.find("조리법");
    let cut_at_step = numbered_step_re()
        .find(text)
        .map(|m| line_start(text, m.start()));

    let cut = match (cut_at_keyword, cut_at_step) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    match cut {
        Some(idx) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn line_start(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx].rfind('\n').map(|p| p + 1).unwrap_or(0)
}

/// Delete lines that advertise allergy/dislike metadata — these must never
/// surface to the client.
fn strip_safety_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.contains("알레르기") && !line.contains("비선호"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize the intro block: remove emoji and informal suffixes, collapse
/// whitespace, ensure terminal punctuation. Operates on every line that
/// isn't the ingredient header or a metadata glyph line, leaving those to
/// `normalize_ingredients`.
fn normalize_intro(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with("재료:") || is_glyph_line(line) {
                return line.to_string();
            }
            let mut out = emoji_re().replace_all(line, "").to_string();
            for suffix in INFORMAL_SUFFIXES {
                if let Some(stripped) = out.strip_suffix(suffix) {
                    out = format!("{stripped}.");
                }
            }
            out = whitespace_re().replace_all(&out, " ").trim().to_string();
            if out.is_empty() {
                return out;
            }
            if !out.ends_with(['.', '!', '?', '다', '요']) {
                out.push('.');
            } else if !out.ends_with('.') && !out.ends_with('!') && !out.ends_with('?') {
                out.push('.');
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_glyph_line(line: &str) -> bool {
    line.contains('⏱') || line.contains('📊') || line.contains('👥')
}

/// Splits on newline and comma, drops vague-quantity entries and entries
/// lacking any digit or recognized unit, joins survivors into one
/// comma-separated line under a single "재료:" header (I4).
fn normalize_ingredients(text: &str) -> String {
    let mut ingredient_line_idx = None;
    let mut entries: Vec<String> = Vec::new();

    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("재료:") {
            ingredient_line_idx = Some(i);
            entries.extend(split_entries(rest));
        }
    }

    let Some(idx) = ingredient_line_idx else {
        return text.to_string();
    };

    let survivors: Vec<String> = entries
        .into_iter()
        .filter(|e| !e.is_empty())
        .filter(|e| !VAGUE_QUANTITY_TOKENS.iter().any(|t| e.contains(t)))
        .filter(|e| has_quantity(e))
        .collect();

    let joined = format!("재료: {}", survivors.join(", "));

    let mut out: Vec<String> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if i == idx {
            out.push(joined.clone());
        } else if line.starts_with("재료:") {
            // Drop any additional stray ingredient-header lines; the first
            // occurrence already absorbed every entry.
            continue;
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

fn split_entries(rest: &str) -> Vec<String> {
    rest.split(|c| c == ',' || c == '\n')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn has_quantity(entry: &str) -> bool {
    entry.chars().any(|c| c.is_ascii_digit()) || UNIT_TOKENS.iter().any(|u| entry.contains(u))
}

/// The full ordered pipeline. Idempotent: `post_process(post_process(x)) ==
/// post_process(x)` for all `x` (I3).
pub fn post_process(text: &str) -> String {
    let s = strip_procedure(text);
    let s = strip_safety_lines(&s);
    let s = normalize_intro(&s);
    normalize_ingredients(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "제육볶음 🎉\n⏱️ 20분 | 📊 쉬움 | 👥 2인분\n맛있는 제육볶음이에요~\n재료: 돼지고기 300g, 양파 적당량, 고추장 1큰술, 설탕 약간\n조리법\n1. 돼지고기를 볶는다\n2. 양파를 넣는다\n알레르기 정보: 대두 함유";

    #[test]
    fn i3_idempotence_holds_on_sample() {
        let once = post_process(SAMPLE);
        let twice = post_process(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn i4_no_vague_quantity_survives() {
        let out = post_process(SAMPLE);
        for token in VAGUE_QUANTITY_TOKENS {
            assert!(!out.contains(token), "vague token {token} survived: {out}");
        }
    }

    #[test]
    fn i5_no_numbered_step_survives() {
        let out = post_process(SAMPLE);
        assert!(!out.contains("1. 돼지고기"));
        assert!(!out.contains("조리법"));
    }

    #[test]
    fn strips_safety_metadata_lines() {
        let out = post_process(SAMPLE);
        assert!(!out.contains("알레르기"));
    }

    #[test]
    fn ingredients_collapse_to_single_comma_joined_line() {
        let out = post_process(SAMPLE);
        let ingredient_lines: Vec<&str> = out.lines().filter(|l| l.starts_with("재료:")).collect();
        assert_eq!(ingredient_lines.len(), 1);
        assert!(ingredient_lines[0].contains("돼지고기 300g"));
        assert!(ingredient_lines[0].contains("고추장 1큰술"));
        assert!(!ingredient_lines[0].contains("설탕"));
        assert!(!ingredient_lines[0].contains("양파 적당량"));
    }

    #[test]
    fn emoji_and_informal_suffix_removed_from_intro() {
        let out = post_process(SAMPLE);
        assert!(!out.contains('🎉'));
        assert!(!out.contains("이에요~"));
    }

    #[test]
    fn idempotence_holds_on_already_processed_text() {
        let once = post_process(SAMPLE);
        let twice = post_process(&once);
        let thrice = post_process(&twice);
        assert_eq!(twice, thrice);
    }
}
