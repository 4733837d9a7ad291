//! In-memory set of rules.
//!
//! The [`RuleSet`] knows nothing about files or notifications. It holds the
//! live rules keyed by ID and answers ID-allocation questions.

use std::{collections::BTreeMap, num::NonZeroUsize};

use tracing::instrument;

use crate::domain::{
    Rule,
    rule_id::{Prefix, RuleId},
};

/// The authoritative in-memory collection of live rules.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<RuleId, Rule>,
}

impl RuleSet {
    /// Inserts a rule, returning the rule it replaced, if any.
    pub fn insert(&mut self, rule: Rule) -> Option<Rule> {
        self.rules.insert(rule.id(), rule)
    }

    /// Retrieves a rule by ID.
    #[must_use]
    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(&id)
    }

    /// Whether a rule with this ID is live.
    #[must_use]
    pub fn contains(&self, id: RuleId) -> bool {
        self.rules.contains_key(&id)
    }

    /// Removes a rule by ID.
    pub fn remove(&mut self, id: RuleId) -> Option<Rule> {
        self.rules.remove(&id)
    }

    /// Removes every rule, returning them in ID order.
    pub fn drain(&mut self) -> Vec<Rule> {
        std::mem::take(&mut self.rules).into_values().collect()
    }

    /// Number of live rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no live rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the rules in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Iterates over the rules carrying `prefix`, in number order.
    pub fn with_prefix(&self, prefix: Prefix) -> impl Iterator<Item = &Rule> {
        let start = RuleId::new(prefix, NonZeroUsize::MIN);
        let end = RuleId::new(prefix, NonZeroUsize::MAX);
        self.rules.range(start..=end).map(|(_, rule)| rule)
    }

    /// Returns the lowest free ID for `prefix`.
    ///
    /// Numbers held by live rules are never handed out again, but a number
    /// freed by deletion is reused before the counter advances past the
    /// highest live number.
    ///
    /// # Panics
    ///
    /// Panics if every number for the prefix is taken.
    #[must_use]
    #[instrument(level = "trace", skip(self))]
    pub fn next_id(&self, prefix: Prefix) -> RuleId {
        let mut candidate = NonZeroUsize::MIN;
        for rule in self.with_prefix(prefix) {
            if rule.id().number() > candidate {
                break;
            }
            candidate = rule
                .id()
                .number()
                .checked_add(1)
                .expect("rule ID overflow!");
        }
        RuleId::new(prefix, candidate)
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        let mut set = Self::default();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Relation, Status};

    fn rule(id: &str) -> Rule {
        Rule::new(
            id.parse().unwrap(),
            "K1".to_string(),
            Some(Relation::Implies),
            "1139101".to_string(),
            Status::Enabled,
        )
    }

    #[test]
    fn first_id_is_one() {
        let set = RuleSet::default();
        assert_eq!(set.next_id(Prefix::BL).to_string(), "BL01");
    }

    #[test]
    fn next_id_advances_past_contiguous_run() {
        let set: RuleSet = ["BL01", "BL02", "TL01"].into_iter().map(rule).collect();
        assert_eq!(set.next_id(Prefix::BL).to_string(), "BL03");
        assert_eq!(set.next_id(Prefix::TL).to_string(), "TL02");
        assert_eq!(set.next_id(Prefix::LS).to_string(), "LS01");
    }

    #[test]
    fn next_id_reuses_freed_gap() {
        let mut set: RuleSet = ["BL01", "BL02", "BL03"].into_iter().map(rule).collect();
        set.remove("BL02".parse().unwrap());
        assert_eq!(set.next_id(Prefix::BL).to_string(), "BL02");
    }

    #[test]
    fn with_prefix_is_restricted_and_ordered() {
        let set: RuleSet = ["TL01", "BL10", "BL02"].into_iter().map(rule).collect();
        let ids: Vec<_> = set.with_prefix(Prefix::BL).map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["BL02", "BL10"]);
    }

    #[test]
    fn drain_empties_the_set() {
        let mut set: RuleSet = ["BL01", "TL01"].into_iter().map(rule).collect();
        let drained = set.drain();
        assert_eq!(drained.len(), 2);
        assert!(set.is_empty());
    }
}
