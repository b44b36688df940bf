use std::collections::HashSet;

use recipe_core::MemberId;
use recipe_protocol::MemberInfo;

/// Immutable-per-request personalization snapshot, fetched once at session
/// init (`init_context`) and never refreshed for the lifetime of the
/// connection. `None` for an unauthenticated guest session — constraint
/// checks that require personalization are skipped, not treated as a
/// violation, in that case.
#[derive(Debug, Clone)]
pub struct Personalization {
    pub member_id: MemberId,
    pub allergies: HashSet<String>,
    pub dislikes: HashSet<String>,
    pub names: Vec<String>,
    pub utensils: HashSet<String>,
}

impl Personalization {
    /// Build from the wire `MemberInfo`. Returns `None` when no `member_id`
    /// was supplied — the session is then unauthenticated and constraint
    /// checks 1 and 2 (allergy/dislike) are skipped entirely, per §4.3.
    pub fn from_member_info(info: &MemberInfo) -> Option<Self> {
        let member_id = info.member_id?;
        Some(Self {
            member_id: MemberId(member_id),
            allergies: lower_set(&info.allergies),
            dislikes: lower_set(&info.dislikes),
            names: info.names.clone(),
            utensils: lower_set(&info.utensils),
        })
    }

    /// `max(1, |names|)` — the serving-size default the Generate stage uses
    /// when no explicit serving count is named in the utterance.
    pub fn default_servings(&self) -> usize {
        self.names.len().max(1)
    }
}

fn lower_set(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_member_id_yields_none() {
        let info = MemberInfo {
            member_id: None,
            ..Default::default()
        };
        assert!(Personalization::from_member_info(&info).is_none());
    }

    #[test]
    fn servings_defaults_to_one_for_empty_names() {
        let info = MemberInfo {
            member_id: Some(1),
            ..Default::default()
        };
        let p = Personalization::from_member_info(&info).unwrap();
        assert_eq!(p.default_servings(), 1);
    }

    #[test]
    fn allergies_are_lowercased() {
        let info = MemberInfo {
            member_id: Some(1),
            allergies: vec!["Shrimp".into()],
            ..Default::default()
        };
        let p = Personalization::from_member_info(&info).unwrap();
        assert!(p.allergies.contains("shrimp"));
    }
}
