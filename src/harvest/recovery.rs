//! Recovery target selection.

use std::collections::HashSet;

use crate::models::CrawlState;

/// Targets a recovery pass works through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryPlan {
    /// In target-list order.
    pub targets: Vec<String>,
    /// How many came from the forward pass's failed set.
    pub from_failed: usize,
    /// How many have no stored record (and were not failed).
    pub missing_from_store: usize,
}

impl RecoveryPlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// `failed ∪ (all − stored)`, keeping the order of `all`.
///
/// Targets resolved as not-found are completed without a stored record, so
/// they appear here too. The recovery partition's own completed set keeps
/// them from being fetched more than once.
pub fn plan_recovery(all: &[String], primary: &CrawlState, stored: &HashSet<String>) -> RecoveryPlan {
    let mut plan = RecoveryPlan::default();
    for target in all {
        if primary.failed().contains(target) {
            plan.from_failed += 1;
        } else if !stored.contains(target) {
            plan.missing_from_store += 1;
        } else {
            continue;
        }
        plan.targets.push(target.clone());
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_failed_and_unstored() {
        let all: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let mut primary = CrawlState::new();
        primary.mark_completed("A");
        primary.mark_completed("B");
        primary.mark_failed("C");
        // C is failed but also has a record from an earlier run
        let stored: HashSet<String> = ["A", "C"].iter().map(|s| s.to_string()).collect();

        let plan = plan_recovery(&all, &primary, &stored);
        assert_eq!(plan.targets, vec!["B", "C", "D"]);
        assert_eq!(plan.from_failed, 1);
        assert_eq!(plan.missing_from_store, 2);
    }

    #[test]
    fn test_everything_stored_means_nothing_to_do() {
        let all: Vec<String> = vec!["A".to_string()];
        let mut primary = CrawlState::new();
        primary.mark_completed("A");
        let stored: HashSet<String> = all.iter().cloned().collect();
        assert!(plan_recovery(&all, &primary, &stored).is_empty());
    }
}
