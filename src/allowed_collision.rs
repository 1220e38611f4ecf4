//! The allowed-collision table and the pair filter consulted by the contact
//! test before generating contacts for a body pair.
//!
//! The filter answers "is this pair exempt from checking", not "may these
//! bodies collide". In particular a `Never` entry means the pair must still
//! be checked, exactly like an absent entry.

use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Classification of a body pair in the allowed-collision table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowedCollision {
    /// Collisions of this pair are never acceptable; the pair is checked.
    Never,
    /// Collisions of this pair are always acceptable; the pair is skipped.
    Always,
    /// Acceptable under an external condition; treated as skippable here.
    Conditional,
}

/// Externally owned per-pair policy, keyed by unordered body name pair.
#[derive(Clone, Default)]
pub struct AllowedCollisionMatrix {
    entries: HashMap<(String, String), AllowedCollision>,
}

impl AllowedCollisionMatrix {
    pub fn new() -> Self {
        AllowedCollisionMatrix::default()
    }

    fn key(body_a: &str, body_b: &str) -> (String, String) {
        if body_a <= body_b {
            (body_a.to_string(), body_b.to_string())
        } else {
            (body_b.to_string(), body_a.to_string())
        }
    }

    pub fn set_entry(&mut self, body_a: &str, body_b: &str, allowed: AllowedCollision) {
        self.entries.insert(Self::key(body_a, body_b), allowed);
    }

    pub fn remove_entry(&mut self, body_a: &str, body_b: &str) {
        self.entries.remove(&Self::key(body_a, body_b));
    }

    pub fn entry(&self, body_a: &str, body_b: &str) -> Option<AllowedCollision> {
        self.entries.get(&Self::key(body_a, body_b)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Predicate the contact test consults once per unordered body pair.
pub trait ContactFilter: Sync {
    /// True when the pair is exempt from checking and must be skipped.
    fn is_pair_allowed(&self, body_a: &str, body_b: &str) -> bool;
}

/// The filter state of one query: the optional allowed-collision table plus
/// the touch-link exemptions of the bodies attached in this query. Built on
/// the stack immediately before the contact test and dropped with it, so no
/// table reference ever outlives the query it was installed for.
pub struct QueryFilter<'a> {
    acm: Option<&'a AllowedCollisionMatrix>,
    touch_links: Vec<(&'a str, &'a HashSet<String>)>,
}

impl<'a> QueryFilter<'a> {
    pub fn new(acm: Option<&'a AllowedCollisionMatrix>) -> Self {
        QueryFilter {
            acm,
            touch_links: Vec::new(),
        }
    }

    /// Registers the touch links of one attached body for this query.
    pub fn with_touch_links(mut self, body: &'a str, links: &'a HashSet<String>) -> Self {
        self.touch_links.push((body, links));
        self
    }
}

impl ContactFilter for QueryFilter<'_> {
    fn is_pair_allowed(&self, body_a: &str, body_b: &str) -> bool {
        for (body, links) in &self.touch_links {
            if (body_a == *body && links.contains(body_b))
                || (body_b == *body && links.contains(body_a))
            {
                debug!("{} touches {}, skipping the pair", body_a, body_b);
                return true;
            }
        }
        let Some(acm) = self.acm else {
            debug!("no table, collision check between {} and {}", body_a, body_b);
            return false;
        };
        match acm.entry(body_a, body_b) {
            None => {
                debug!("no entry, collision check between {} and {}", body_a, body_b);
                false
            }
            Some(AllowedCollision::Never) => {
                debug!("never-allowed entry, collision check between {} and {}", body_a, body_b);
                false
            }
            Some(_) => {
                debug!("allowed entry, skipping check between {} and {}", body_a, body_b);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_unordered() {
        let mut acm = AllowedCollisionMatrix::new();
        acm.set_entry("b", "a", AllowedCollision::Always);
        assert_eq!(acm.entry("a", "b"), Some(AllowedCollision::Always));
        assert_eq!(acm.entry("b", "a"), Some(AllowedCollision::Always));
        acm.remove_entry("a", "b");
        assert!(acm.is_empty());
    }

    #[test]
    fn filter_truth_table() {
        // No table installed: every pair is checked.
        let filter = QueryFilter::new(None);
        assert!(!filter.is_pair_allowed("a", "b"));

        let mut acm = AllowedCollisionMatrix::new();
        acm.set_entry("a", "b", AllowedCollision::Never);
        acm.set_entry("a", "c", AllowedCollision::Always);
        acm.set_entry("b", "c", AllowedCollision::Conditional);
        let filter = QueryFilter::new(Some(&acm));

        // No entry for the pair: checked.
        assert!(!filter.is_pair_allowed("a", "d"));
        // Never-allowed entry still means the pair is checked.
        assert!(!filter.is_pair_allowed("a", "b"));
        // Only a non-Never entry exempts the pair.
        assert!(filter.is_pair_allowed("a", "c"));
        assert!(filter.is_pair_allowed("c", "b"));
    }

    #[test]
    fn touch_links_exempt_the_attached_pair() {
        let mut touches = HashSet::new();
        touches.insert("gripper".to_string());
        let filter = QueryFilter::new(None).with_touch_links("workpiece", &touches);

        assert!(filter.is_pair_allowed("workpiece", "gripper"));
        assert!(filter.is_pair_allowed("gripper", "workpiece"));
        assert!(!filter.is_pair_allowed("workpiece", "arm"));
    }
}
