//! Group logic
//!
//! A group is satisfied according to how many of its direct children are.
//! The SQL emitter compares the same counts, so both backends share
//! [`GroupKind::accepts`].

use octofhir_cohort_expression::{CriteriaGroup, GroupType};

use crate::plan::{GroupKind, GroupPlan};

impl GroupKind {
    pub fn from_group(group: &CriteriaGroup) -> Self {
        let threshold = u32::try_from(group.threshold()).unwrap_or(0);
        match group.group_type {
            GroupType::All => Self::All,
            GroupType::Any => Self::Any,
            GroupType::AtLeast => Self::AtLeast(threshold),
            GroupType::AtMost => Self::AtMost(threshold),
        }
    }

    /// Whether `satisfied` of `total` children satisfy the operator
    pub fn accepts(&self, satisfied: usize, total: usize) -> bool {
        match *self {
            Self::All => satisfied == total,
            Self::Any => satisfied > 0,
            Self::AtLeast(n) => satisfied >= n as usize,
            Self::AtMost(n) => satisfied <= n as usize,
        }
    }

    pub fn combine(&self, children: &[bool]) -> bool {
        let satisfied = children.iter().filter(|c| **c).count();
        self.accepts(satisfied, children.len())
    }
}

impl GroupPlan {
    /// Group result as seen by its parent, given its children's results
    ///
    /// Children are ordered criteria, then demographics, then groups; each
    /// nested group's own inversion must already be applied.
    pub fn evaluate(&self, children: &[bool]) -> bool {
        if self.is_empty() {
            return true;
        }
        self.kind.combine(children) != self.invert
    }
}
