use std::collections::HashSet;

use recipe_protocol::{ModificationEntry, ModificationType};

/// Derived, never stored: computing this fresh from the ledger on every call
/// avoids a cached view drifting from the source of truth (§9 Design Notes).
///
/// `effective_remove_set = (⋃ remove_ingredients of remove/replace entries)
/// − (⋃ add_ingredients of replace entries)`
pub fn effective_remove_set(ledger: &[ModificationEntry]) -> HashSet<String> {
    let mut removes: HashSet<String> = HashSet::new();
    let mut replace_adds: HashSet<String> = HashSet::new();

    for entry in ledger {
        match entry.kind {
            ModificationType::Remove => {
                removes.extend(entry.remove_ingredients.iter().cloned());
            }
            ModificationType::Replace => {
                removes.extend(entry.remove_ingredients.iter().cloned());
                replace_adds.extend(entry.add_ingredients.iter().cloned());
            }
            ModificationType::Add | ModificationType::Modify => {}
        }
    }

    removes.difference(&replace_adds).cloned().collect()
}

/// The clause the Generate stage assembles to instruct the generator to
/// exclude names — identical derivation to `effective_remove_set`, kept as a
/// distinct entry point because the two call sites (Constraint Engine vs.
/// Pipeline Executor generate stage) reason about it differently even though
/// the math is the same (§4.4, §9).
pub fn modification_constraints(ledger: &[ModificationEntry]) -> HashSet<String> {
    effective_remove_set(ledger)
}

/// Apply a resolved ledger-conflict confirmation: every entry whose
/// remove-list intersects `conflict` has those names stripped; an entry that
/// becomes fully empty (no remove, no add ingredients left) is dropped
/// entirely (§4.3).
pub fn patch_ledger_for_resolved_conflict(
    ledger: &[ModificationEntry],
    conflict: &HashSet<String>,
) -> Vec<ModificationEntry> {
    ledger
        .iter()
        .filter_map(|entry| {
            if entry.remove_ingredients.iter().any(|i| conflict.contains(i)) {
                let remaining: Vec<String> = entry
                    .remove_ingredients
                    .iter()
                    .filter(|i| !conflict.contains(*i))
                    .cloned()
                    .collect();
                if remaining.is_empty() && entry.add_ingredients.is_empty() {
                    None
                } else {
                    let mut patched = entry.clone();
                    patched.remove_ingredients = remaining;
                    Some(patched)
                }
            } else {
                Some(entry.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: ModificationType, remove: &[&str], add: &[&str]) -> ModificationEntry {
        ModificationEntry {
            request: "test".into(),
            kind,
            remove_ingredients: remove.iter().map(|s| s.to_string()).collect(),
            add_ingredients: add.iter().map(|s| s.to_string()).collect(),
            timestamp: "2026-07-28T00:00:00Z".into(),
        }
    }

    #[test]
    fn remove_alone_accumulates() {
        let ledger = vec![entry(ModificationType::Remove, &["돼지고기"], &[])];
        let set = effective_remove_set(&ledger);
        assert!(set.contains("돼지고기"));
    }

    #[test]
    fn replace_overrides_remove_for_the_added_ingredient() {
        // S5: replace 돼지고기 -> 참치 must not leave 돼지고기 in the effective set.
        let ledger = vec![entry(ModificationType::Replace, &["돼지고기"], &["참치"])];
        let set = effective_remove_set(&ledger);
        assert!(!set.contains("돼지고기"));
    }

    #[test]
    fn a_later_replace_does_not_erase_an_earlier_unrelated_remove() {
        let ledger = vec![
            entry(ModificationType::Remove, &["양파"], &[]),
            entry(ModificationType::Replace, &["돼지고기"], &["참치"]),
        ];
        let set = effective_remove_set(&ledger);
        assert!(set.contains("양파"));
        assert!(!set.contains("돼지고기"));
    }

    #[test]
    fn add_and_modify_entries_never_contribute_removes() {
        let ledger = vec![entry(ModificationType::Add, &[], &["고추"])];
        assert!(effective_remove_set(&ledger).is_empty());
    }

    #[test]
    fn patching_drops_entries_left_fully_empty() {
        let ledger = vec![entry(ModificationType::Remove, &["돼지고기"], &[])];
        let conflict: HashSet<String> = ["돼지고기".to_string()].into_iter().collect();
        let patched = patch_ledger_for_resolved_conflict(&ledger, &conflict);
        assert!(patched.is_empty());
    }

    #[test]
    fn patching_keeps_entries_with_surviving_ingredients() {
        let ledger = vec![entry(ModificationType::Remove, &["돼지고기", "양파"], &[])];
        let conflict: HashSet<String> = ["돼지고기".to_string()].into_iter().collect();
        let patched = patch_ledger_for_resolved_conflict(&ledger, &conflict);
        assert_eq!(patched.len(), 1);
        assert_eq!(patched[0].remove_ingredients, vec!["양파".to_string()]);
    }
}
