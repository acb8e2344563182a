//! Desired set of network rules, keyed by (direction, protocol, listen port)
//!
//! The table holds the declarative desired state. Rules enter unstored; the
//! host rule collaborator applies [`RuleTable::pending`] rules and marks
//! them stored, so re-applying an unchanged table is a no-op.

use std::collections::BTreeMap;

use crate::rule::{ProxyRule, RuleKey};

/// Rules indexed by key, iterated in key order
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: BTreeMap<RuleKey, ProxyRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Insert a rule, replacing any rule with the same key
    ///
    /// Re-inserting a rule identical to an already stored one keeps it
    /// stored. Returns the replaced rule, if any.
    pub fn insert(&mut self, mut rule: ProxyRule) -> Option<ProxyRule> {
        let key = rule.key();
        if let Some(existing) = self.rules.get(&key) {
            if *existing == rule {
                rule.stored = existing.stored;
            } else {
                log::info!("Rule {} replaced: {} -> {}", key, existing, rule);
            }
        }
        self.rules.insert(key, rule)
    }

    pub fn remove(&mut self, key: &RuleKey) -> Option<ProxyRule> {
        self.rules.remove(key)
    }

    pub fn get(&self, key: &RuleKey) -> Option<&ProxyRule> {
        self.rules.get(key)
    }

    /// Rules not yet applied to the host
    pub fn pending(&self) -> impl Iterator<Item = &ProxyRule> {
        self.rules.values().filter(|r| !r.stored)
    }

    /// Record that the rule for `key` has been applied
    ///
    /// Returns false if no such rule exists.
    pub fn mark_stored(&mut self, key: &RuleKey) -> bool {
        match self.rules.get_mut(key) {
            Some(rule) => {
                rule.stored = true;
                true
            }
            None => false,
        }
    }

    /// Invocation arguments for every rule, in key order
    pub fn invocation_arguments(&self) -> Vec<String> {
        self.rules.values().map(|r| r.as_invocation_argument()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
