//! Visibility baseline and deviation tracking
//!
//! A feature set stores one baseline visibility flag plus the ids of the
//! member features whose visibility differs from it. Whole-set toggles are
//! O(1): they set the baseline and forget the deviations, instead of
//! rewriting every member.
//!
//! When every member ends up deviating, the tracker flips the baseline and
//! clears the deviations, so the deviation set never grows to the full
//! membership.

use featuredb_core::{FeatureId, FeatureSet};
use rustc_hash::FxHashSet;

/// Outcome of a single-feature visibility toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityChange {
    /// Requested value was already in effect
    Unchanged,
    /// Feature now deviates from the baseline
    Deviated,
    /// Feature matches the baseline again
    Restored,
    /// Every member deviated; the baseline flipped and deviations cleared
    Collapsed,
}

impl VisibilityChange {
    /// Whether any state changed
    pub fn is_change(self) -> bool {
        self != VisibilityChange::Unchanged
    }
}

/// Baseline visibility plus deviations for one feature set
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    visible: bool,
    version: i64,
    deviations: FxHashSet<FeatureId>,
}

impl VisibilityTracker {
    /// Fresh tracker at version 1
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            version: 1,
            deviations: FxHashSet::default(),
        }
    }

    /// Baseline visibility
    pub fn baseline(&self) -> bool {
        self.visible
    }

    /// Bumped on every set-level change
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Check flag: some member deviates from the baseline
    pub fn has_deviations(&self) -> bool {
        !self.deviations.is_empty()
    }

    /// Number of deviating members
    pub fn deviation_count(&self) -> usize {
        self.deviations.len()
    }

    /// Ids of deviating members
    pub fn deviations(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.deviations.iter().copied()
    }

    /// Effective visibility of a member
    pub fn is_visible(&self, fid: FeatureId) -> bool {
        self.visible != self.deviations.contains(&fid)
    }

    /// Whether any of `member_count` members is effectively visible
    ///
    /// An empty set reports its baseline.
    pub fn any_visible(&self, member_count: usize) -> bool {
        if self.deviations.is_empty() {
            self.visible
        } else if self.visible {
            self.deviations.len() < member_count
        } else {
            true
        }
    }

    /// Number of effectively visible members out of `member_count`
    pub fn visible_count(&self, member_count: usize) -> usize {
        if self.visible {
            member_count.saturating_sub(self.deviations.len())
        } else {
            self.deviations.len()
        }
    }

    /// Toggle one member of a set with `member_count` members
    pub fn set_feature_visible(
        &mut self,
        fid: FeatureId,
        visible: bool,
        member_count: usize,
    ) -> VisibilityChange {
        if self.is_visible(fid) == visible {
            return VisibilityChange::Unchanged;
        }
        if visible == self.visible {
            self.deviations.remove(&fid);
            return VisibilityChange::Restored;
        }
        self.deviations.insert(fid);
        if self.deviations.len() >= member_count {
            self.set_visible(visible);
            return VisibilityChange::Collapsed;
        }
        VisibilityChange::Deviated
    }

    /// Set the baseline directly, clearing every deviation
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.deviations.clear();
        self.version += 1;
    }

    /// Drop a member that left the set, now holding `member_count` members
    ///
    /// Removing a member that followed the baseline can leave every
    /// remaining member deviating; the tracker collapses in that case.
    pub fn forget(&mut self, fid: FeatureId, member_count: usize) -> VisibilityChange {
        let removed = self.deviations.remove(&fid);
        if !self.deviations.is_empty() && self.deviations.len() >= member_count {
            let flipped = !self.visible;
            self.set_visible(flipped);
            return VisibilityChange::Collapsed;
        }
        if removed {
            VisibilityChange::Restored
        } else {
            VisibilityChange::Unchanged
        }
    }

    /// Copy baseline, version and check flag onto a set descriptor
    pub fn stamp(&self, set: &mut FeatureSet) {
        set.visible = self.visible;
        set.visible_version = self.version;
        set.visible_check = self.has_deviations();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent_toggle() {
        let mut t = VisibilityTracker::new(true);
        assert_eq!(t.set_feature_visible(1, true, 3), VisibilityChange::Unchanged);
        assert!(!t.has_deviations());

        assert_eq!(t.set_feature_visible(1, false, 3), VisibilityChange::Deviated);
        let before: Vec<_> = t.deviations().collect();
        assert_eq!(t.set_feature_visible(1, false, 3), VisibilityChange::Unchanged);
        assert_eq!(t.deviations().collect::<Vec<_>>(), before);
        assert_eq!(t.version(), 1);
    }

    #[test]
    fn test_restore_removes_deviation() {
        let mut t = VisibilityTracker::new(true);
        t.set_feature_visible(2, false, 3);
        assert!(!t.is_visible(2));
        assert_eq!(t.set_feature_visible(2, true, 3), VisibilityChange::Restored);
        assert!(t.is_visible(2));
        assert!(!t.has_deviations());
    }

    #[test]
    fn test_collapse_flips_baseline() {
        let mut t = VisibilityTracker::new(true);
        assert_eq!(t.set_feature_visible(1, false, 3), VisibilityChange::Deviated);
        assert_eq!(t.set_feature_visible(2, false, 3), VisibilityChange::Deviated);
        assert_eq!(t.set_feature_visible(3, false, 3), VisibilityChange::Collapsed);
        assert!(!t.baseline());
        assert!(!t.has_deviations());
        assert_eq!(t.version(), 2);
        for fid in 1..=3 {
            assert!(!t.is_visible(fid));
        }
    }

    #[test]
    fn test_set_toggle_clears_deviations() {
        let mut t = VisibilityTracker::new(true);
        t.set_feature_visible(2, false, 3);
        t.set_visible(false);
        assert!(!t.has_deviations());
        assert!(!t.is_visible(2));
        assert!(!t.is_visible(1));
        assert_eq!(t.version(), 2);
    }

    #[test]
    fn test_counts() {
        let mut t = VisibilityTracker::new(true);
        t.set_feature_visible(2, false, 4);
        assert_eq!(t.visible_count(4), 3);
        assert!(t.any_visible(4));

        let mut hidden = VisibilityTracker::new(false);
        assert!(!hidden.any_visible(4));
        hidden.set_feature_visible(1, true, 4);
        assert_eq!(hidden.visible_count(4), 1);
        assert!(hidden.any_visible(4));
    }

    #[test]
    fn test_forget_collapses_when_rest_deviates() {
        let mut t = VisibilityTracker::new(true);
        t.set_feature_visible(1, false, 3);
        t.set_feature_visible(2, false, 3);
        assert_eq!(t.forget(3, 2), VisibilityChange::Collapsed);
        assert!(!t.baseline());
        assert!(!t.is_visible(1));
        assert!(!t.is_visible(2));

        let mut t = VisibilityTracker::new(true);
        t.set_feature_visible(1, false, 3);
        assert_eq!(t.forget(1, 2), VisibilityChange::Restored);
        assert_eq!(t.forget(9, 2), VisibilityChange::Unchanged);
    }

    #[test]
    fn test_stamp() {
        let mut t = VisibilityTracker::new(true);
        t.set_feature_visible(5, false, 2);
        let mut set = FeatureSet::default();
        t.stamp(&mut set);
        assert!(set.visible);
        assert!(set.visible_check);
        assert_eq!(set.visible_version, 1);
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        proptest! {
            // Tracker agrees with an explicit per-feature model under any
            // sequence of feature and set toggles, and never stores a
            // deviation for every member.
            #[test]
            fn matches_explicit_model(
                members in 1usize..8,
                ops in proptest::collection::vec((0usize..9, any::<bool>()), 0..40),
            ) {
                let mut tracker = VisibilityTracker::new(true);
                let mut model: HashMap<FeatureId, bool> =
                    (1..=members as FeatureId).map(|fid| (fid, true)).collect();

                for (target, visible) in ops {
                    if target == 0 {
                        tracker.set_visible(visible);
                        for v in model.values_mut() {
                            *v = visible;
                        }
                    } else {
                        let fid = ((target - 1) % members) as FeatureId + 1;
                        tracker.set_feature_visible(fid, visible, members);
                        model.insert(fid, visible);
                    }
                    prop_assert!(tracker.deviation_count() < members);
                    for (fid, expected) in &model {
                        prop_assert_eq!(tracker.is_visible(*fid), *expected);
                    }
                }
            }
        }
    }
}
