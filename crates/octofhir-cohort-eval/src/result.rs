//! Execution output

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One cohort membership interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CohortEra {
    pub subject_id: i64,
    pub cohort_start_date: NaiveDate,
    pub cohort_end_date: NaiveDate,
}

/// Population left after an inclusion rule and every rule before it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttritionRecord {
    pub rule_index: usize,
    pub rule_name: String,
    pub surviving_count: usize,
    pub surviving_persons: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortResult {
    /// Sorted by subject, then start
    pub eras: Vec<CohortEra>,
    /// In rule order
    pub attrition: Vec<AttritionRecord>,
}

impl CohortResult {
    /// Distinct subjects with at least one era
    pub fn subjects(&self) -> Vec<i64> {
        let mut subjects: Vec<i64> = self.eras.iter().map(|e| e.subject_id).collect();
        subjects.dedup();
        subjects
    }

    pub fn eras_of(&self, subject_id: i64) -> impl Iterator<Item = &CohortEra> {
        self.eras.iter().filter(move |e| e.subject_id == subject_id)
    }
}
