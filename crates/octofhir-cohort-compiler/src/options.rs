//! Compilation options

use octofhir_cohort_expression::DEFAULT_MAX_GROUP_DEPTH;
use serde::{Deserialize, Serialize};

/// Days an event lasts when its domain has no end date (or the end is null)
pub const DEFAULT_EVENT_DAYS: i64 = 1;

/// Configuration for [`CohortCompiler`](crate::CohortCompiler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Deepest permitted criteria-group nesting; deeper input is rejected
    pub max_group_depth: usize,
    /// Duration given to events without an end date
    pub default_event_days: i64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_group_depth: DEFAULT_MAX_GROUP_DEPTH,
            default_event_days: DEFAULT_EVENT_DAYS,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_group_depth(mut self, depth: usize) -> Self {
        self.max_group_depth = depth;
        self
    }

    pub fn with_default_event_days(mut self, days: i64) -> Self {
        self.default_event_days = days;
        self
    }
}
