use std::collections::HashSet;

use recipe_sessions::{ledger, DialogSession, PendingConfirmation};

/// Result of running the Constraint Engine against a search-intent
/// utterance (§4.3). Ordering is baked into `check`'s control flow, not
/// into this enum: allergy always wins over dislike, dislike over ledger.
#[derive(Debug, Clone)]
pub enum ConstraintOutcome {
    HardBlock { content: String },
    DislikePending { matched: HashSet<String> },
    LedgerPending { conflicted: HashSet<String> },
    Proceed,
}

fn lower(s: &str) -> String {
    s.to_lowercase()
}

fn matches_any<'a>(utterance_lower: &str, names: impl Iterator<Item = &'a String>) -> HashSet<String> {
    names
        .filter(|n| utterance_lower.contains(n.as_str()))
        .cloned()
        .collect()
}

/// Applies the three checks in exact order (§4.3): allergy (hard block) >
/// dislike (soft, minus already-allowed names) > ledger conflict (soft).
/// On a positive outcome, the matching `pending_*` slot on `session` is
/// populated by the caller — this function only decides which, if any.
pub fn check(session: &DialogSession, utterance: &str) -> ConstraintOutcome {
    let utterance_lower = lower(utterance);

    if let Some(p) = &session.personalization {
        let allergy_hits = matches_any(&utterance_lower, p.allergies.iter());
        if !allergy_hits.is_empty() {
            let names: Vec<&str> = allergy_hits.iter().map(|s| s.as_str()).collect();
            return ConstraintOutcome::HardBlock {
                content: format!(
                    "죄송해요, {}이(가) 포함될 수 있는 요청이라 도와드릴 수 없어요. 알레르기 안전을 위해 이 요청은 진행하지 않습니다.",
                    names.join(", ")
                ),
            };
        }

        let dislike_hits: HashSet<String> = matches_any(&utterance_lower, p.dislikes.iter())
            .into_iter()
            .filter(|n| !session.temporarily_allowed_dislikes.contains(n))
            .collect();
        if !dislike_hits.is_empty() {
            return ConstraintOutcome::DislikePending {
                matched: dislike_hits,
            };
        }
    }

    let accumulated_removes = ledger::effective_remove_set(&session.modification_ledger);
    let ledger_hits: HashSet<String> = accumulated_removes
        .into_iter()
        .filter(|n| utterance_lower.contains(n.as_str()))
        .collect();
    if !ledger_hits.is_empty() {
        return ConstraintOutcome::LedgerPending {
            conflicted: ledger_hits,
        };
    }

    ConstraintOutcome::Proceed
}

/// Apply the patched environment described in §4.3 once a dislike
/// confirmation resolves positively: the matched names are excluded from
/// the effective dislike set for this one request (the caller does that by
/// simply not re-checking dislikes) AND permanently added to
/// `temporarily_allowed_dislikes` (I7).
pub fn apply_dislike_confirmation(session: &mut DialogSession, matched: &HashSet<String>) {
    session.allow_dislike_temporarily(matched.iter().cloned());
}

/// Apply the patched ledger described in §4.3 once a ledger confirmation
/// resolves positively.
pub fn apply_ledger_confirmation(session: &mut DialogSession, conflicted: &HashSet<String>) {
    session.modification_ledger = ledger::patch_ledger_for_resolved_conflict(
        &session.modification_ledger,
        conflicted,
    );
}

/// Build the pending-confirmation slot for a session that is about to park
/// awaiting a yes/no answer, enforcing I6 (never both kinds at once) by
/// construction — assigning one variant always clears the other.
pub fn set_pending(session: &mut DialogSession, outcome: &ConstraintOutcome, query: &str) {
    match outcome {
        ConstraintOutcome::DislikePending { matched } => {
            session.pending = Some(PendingConfirmation::Dislike {
                query: query.to_string(),
                matched_dislikes: matched.clone(),
            });
        }
        ConstraintOutcome::LedgerPending { conflicted } => {
            session.pending = Some(PendingConfirmation::Ledger {
                query: query.to_string(),
                conflicted_ingredients: conflicted.clone(),
            });
        }
        _ => {}
    }
}
