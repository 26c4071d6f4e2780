//! Cohort expression structures
//!
//! The types mirror the established cohort-expression JSON schema: PascalCase
//! keys for expression nodes, camelCase keys inside concept sets and
//! inclusion rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::criteria::{Criteria, DateField};
use crate::filters::{Concept, ConceptId, ConceptSetId, ConceptSetSelection, DateRange, NumericRange};

// ============================================================================
// Root
// ============================================================================

/// Root of a cohort definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CohortExpression {
    #[serde(rename = "cdmVersionRange", default, skip_serializing_if = "Option::is_none")]
    pub cdm_version_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub concept_sets: Vec<ConceptSet>,
    pub primary_criteria: PrimaryCriteria,
    /// Narrows the primary population without contributing attrition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_criteria: Option<CriteriaGroup>,
    /// Kept for round trips only; compiled cohorts do not apply it
    #[serde(default, skip_serializing_if = "ResultLimit::is_all")]
    pub qualified_limit: ResultLimit,
    #[serde(default, skip_serializing_if = "ResultLimit::is_all")]
    pub expression_limit: ResultLimit,
    #[serde(default)]
    pub inclusion_rules: Vec<InclusionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_strategy: Option<EndStrategy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub censoring_criteria: Vec<Criteria>,
    #[serde(default)]
    pub collapse_settings: CollapseSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub censor_window: Option<Period>,
}

impl CohortExpression {
    /// Expression with the given primary criteria and nothing else
    pub fn new(primary_criteria: PrimaryCriteria) -> Self {
        Self {
            cdm_version_range: None,
            title: None,
            concept_sets: Vec::new(),
            primary_criteria,
            additional_criteria: None,
            qualified_limit: ResultLimit::default(),
            expression_limit: ResultLimit::default(),
            inclusion_rules: Vec::new(),
            end_strategy: None,
            censoring_criteria: Vec::new(),
            collapse_settings: CollapseSettings::default(),
            censor_window: None,
        }
    }

    /// Look up a concept set by id
    pub fn concept_set(&self, id: ConceptSetId) -> Option<&ConceptSet> {
        self.concept_sets.iter().find(|cs| cs.id == id)
    }
}

// ============================================================================
// Concept Sets
// ============================================================================

/// A named set of vocabulary concepts, resolved by the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSet {
    pub id: ConceptSetId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expression: ConceptSetExpression,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptSetExpression {
    #[serde(default)]
    pub items: Vec<ConceptSetItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSetItem {
    pub concept: Concept,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub include_descendants: bool,
    #[serde(default)]
    pub include_mapped: bool,
}

impl ConceptSetItem {
    pub fn new(concept_id: ConceptId) -> Self {
        Self {
            concept: Concept::new(concept_id),
            is_excluded: false,
            include_descendants: false,
            include_mapped: false,
        }
    }

    pub fn descendants(mut self) -> Self {
        self.include_descendants = true;
        self
    }

    pub fn mapped(mut self) -> Self {
        self.include_mapped = true;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.is_excluded = true;
        self
    }

    pub fn concept_id(&self) -> ConceptId {
        self.concept.concept_id
    }
}

impl ConceptSet {
    pub fn new(id: ConceptSetId, name: impl Into<String>, items: Vec<ConceptSetItem>) -> Self {
        Self {
            id,
            name: name.into(),
            expression: ConceptSetExpression { items },
        }
    }

    pub fn items(&self) -> &[ConceptSetItem] {
        &self.expression.items
    }
}

// ============================================================================
// Primary Criteria
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrimaryCriteria {
    #[serde(default)]
    pub criteria_list: Vec<Criteria>,
    #[serde(default)]
    pub observation_window: ObservationWindow,
    #[serde(default)]
    pub primary_criteria_limit: ResultLimit,
}

impl PrimaryCriteria {
    pub fn new(criteria_list: Vec<Criteria>) -> Self {
        Self {
            criteria_list,
            observation_window: ObservationWindow::default(),
            primary_criteria_limit: ResultLimit::default(),
        }
    }
}

/// Continuous observation required before and after the index date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObservationWindow {
    #[serde(default)]
    pub prior_days: i32,
    #[serde(default)]
    pub post_days: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitType {
    #[default]
    #[serde(alias = "all", alias = "ALL")]
    All,
    #[serde(alias = "first", alias = "FIRST")]
    First,
    #[serde(alias = "last", alias = "LAST")]
    Last,
}

/// Per-subject limit on retained events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultLimit {
    #[serde(rename = "Type", default)]
    pub limit_type: LimitType,
}

impl ResultLimit {
    pub const fn first() -> Self {
        Self {
            limit_type: LimitType::First,
        }
    }

    pub fn is_all(&self) -> bool {
        self.limit_type == LimitType::All
    }
}

// ============================================================================
// Criteria Groups
// ============================================================================

/// Boolean operator of a criteria group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    #[default]
    All,
    Any,
    AtLeast,
    AtMost,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Any => write!(f, "ANY"),
            Self::AtLeast => write!(f, "AT_LEAST"),
            Self::AtMost => write!(f, "AT_MOST"),
        }
    }
}

/// A node of the boolean inclusion tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CriteriaGroup {
    #[serde(rename = "Type", default)]
    pub group_type: GroupType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    #[serde(default)]
    pub criteria_list: Vec<CorrelatedCriteria>,
    #[serde(default)]
    pub demographic_criteria_list: Vec<DemographicCriteria>,
    #[serde(default)]
    pub groups: Vec<CriteriaGroup>,
    /// Negates the group's result at its parent
    #[serde(default, skip_serializing_if = "is_false")]
    pub invert: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CriteriaGroup {
    pub fn new(group_type: GroupType) -> Self {
        Self {
            group_type,
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: i32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_criteria(mut self, criteria: CorrelatedCriteria) -> Self {
        self.criteria_list.push(criteria);
        self
    }

    pub fn with_demographic(mut self, demographic: DemographicCriteria) -> Self {
        self.demographic_criteria_list.push(demographic);
        self
    }

    pub fn with_group(mut self, group: CriteriaGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria_list.is_empty() && self.demographic_criteria_list.is_empty() && self.groups.is_empty()
    }

    /// Number of direct children
    pub fn child_count(&self) -> usize {
        self.criteria_list.len() + self.demographic_criteria_list.len() + self.groups.len()
    }

    /// Threshold of AT_LEAST / AT_MOST groups with their schema defaults
    pub fn threshold(&self) -> i32 {
        match self.group_type {
            GroupType::AtLeast => self.count.unwrap_or(1),
            GroupType::AtMost => self.count.unwrap_or(0),
            GroupType::All | GroupType::Any => self.count.unwrap_or(0),
        }
    }
}

/// A criterion evaluated relative to an index event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorrelatedCriteria {
    pub criteria: Criteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_window: Option<Window>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_window: Option<Window>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict_visit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_observation_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<Occurrence>,
}

impl CorrelatedCriteria {
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            start_window: None,
            end_window: None,
            restrict_visit: None,
            ignore_observation_period: None,
            occurrence: None,
        }
    }

    pub fn with_start_window(mut self, window: Window) -> Self {
        self.start_window = Some(window);
        self
    }

    pub fn with_end_window(mut self, window: Window) -> Self {
        self.end_window = Some(window);
        self
    }

    pub fn with_occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = Some(occurrence);
        self
    }
}

/// One side of a temporal window: `Days * Coeff` from the anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Endpoint {
    /// `None` means unbounded
    #[serde(default)]
    pub days: Option<i32>,
    pub coeff: i32,
}

impl Endpoint {
    pub const fn before(days: i32) -> Self {
        Self {
            days: Some(days),
            coeff: -1,
        }
    }

    pub const fn after(days: i32) -> Self {
        Self {
            days: Some(days),
            coeff: 1,
        }
    }

    pub const fn unbounded(coeff: i32) -> Self {
        Self { days: None, coeff }
    }

    /// Signed day offset, or `None` when unbounded
    pub fn offset(&self) -> Option<i64> {
        self.days.map(|d| i64::from(d) * i64::from(self.coeff))
    }
}

/// Temporal window relative to the index event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Window {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_index_end: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_event_end: Option<bool>,
}

impl Window {
    pub fn between(start: Endpoint, end: Endpoint) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            use_index_end: None,
            use_event_end: None,
        }
    }
}

/// Occurrence-count comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OccurrenceType {
    Exactly,
    AtMost,
    AtLeast,
}

impl TryFrom<u8> for OccurrenceType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Exactly),
            1 => Ok(Self::AtMost),
            2 => Ok(Self::AtLeast),
            other => Err(format!("invalid occurrence type {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<OccurrenceType> for u8 {
    fn from(value: OccurrenceType) -> Self {
        match value {
            OccurrenceType::Exactly => 0,
            OccurrenceType::AtMost => 1,
            OccurrenceType::AtLeast => 2,
        }
    }
}

/// Column counted by distinct occurrence constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountColumn {
    DaysSupply,
    DomainConcept,
    DomainSourceConcept,
    Duration,
    EndDate,
    EraOccurrences,
    GapDays,
    Quantity,
    RangeHigh,
    RangeLow,
    Refills,
    StartDate,
    Unit,
    ValueAsNumber,
    VisitId,
    VisitDetailId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Occurrence {
    #[serde(rename = "Type")]
    pub occurrence_type: OccurrenceType,
    pub count: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_distinct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_column: Option<CountColumn>,
}

impl Occurrence {
    pub const fn at_least(count: i32) -> Self {
        Self {
            occurrence_type: OccurrenceType::AtLeast,
            count,
            is_distinct: false,
            count_column: None,
        }
    }

    pub const fn exactly(count: i32) -> Self {
        Self {
            occurrence_type: OccurrenceType::Exactly,
            count,
            is_distinct: false,
            count_column: None,
        }
    }

    pub const fn at_most(count: i32) -> Self {
        Self {
            occurrence_type: OccurrenceType::AtMost,
            count,
            is_distinct: false,
            count_column: None,
        }
    }
}

/// Person-level predicate evaluated at the index event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DemographicCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub race: Vec<Concept>,
    #[serde(rename = "RaceCS", skip_serializing_if = "Option::is_none")]
    pub race_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ethnicity: Vec<Concept>,
    #[serde(rename = "EthnicityCS", skip_serializing_if = "Option::is_none")]
    pub ethnicity_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
}

// ============================================================================
// Inclusion Rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionRule {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub expression: CriteriaGroup,
}

impl InclusionRule {
    pub fn new(name: impl Into<String>, expression: CriteriaGroup) -> Self {
        Self {
            name: name.into(),
            description: None,
            expression,
        }
    }
}

// ============================================================================
// End Strategy, Censoring and Collapse
// ============================================================================

/// How each retained episode's end date is computed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_offset: Option<DateOffsetStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_era: Option<CustomEraStrategy>,
}

impl EndStrategy {
    pub fn is_empty(&self) -> bool {
        self.date_offset.is_none() && self.custom_era.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateOffsetStrategy {
    #[serde(default)]
    pub date_field: DateField,
    #[serde(default)]
    pub offset: i32,
}

/// Continuous drug exposure end strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomEraStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_codeset_id: Option<ConceptSetId>,
    #[serde(default)]
    pub gap_days: i32,
    #[serde(default)]
    pub offset: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_supply_override: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollapseType {
    #[default]
    #[serde(rename = "ERA")]
    Era,
}

/// Era collapse configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CollapseSettings {
    #[serde(default)]
    pub collapse_type: CollapseType,
    /// Gap tolerance in days between episodes that still merge
    #[serde(rename = "EraPad", alias = "EraGapDays", default)]
    pub era_gap_days: i32,
    /// Days added to both bounds of every episode before merging
    #[serde(default, skip_serializing_if = "is_zero")]
    pub era_pad_days: i32,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

/// Calendar window bounding retained episodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_type_wire_names() {
        let group: CriteriaGroup = serde_json::from_str(r#"{"Type": "AT_LEAST", "Count": 2}"#).unwrap();
        assert_eq!(group.group_type, GroupType::AtLeast);
        assert_eq!(group.threshold(), 2);
        assert!(group.is_empty());
    }

    #[test]
    fn test_threshold_defaults() {
        assert_eq!(CriteriaGroup::new(GroupType::AtLeast).threshold(), 1);
        assert_eq!(CriteriaGroup::new(GroupType::AtMost).threshold(), 0);
    }

    #[test]
    fn test_occurrence_type_is_numeric() {
        let occ: Occurrence = serde_json::from_str(r#"{"Type": 2, "Count": 1}"#).unwrap();
        assert_eq!(occ, Occurrence::at_least(1));
        assert!(serde_json::from_str::<Occurrence>(r#"{"Type": 5, "Count": 1}"#).is_err());
        assert_eq!(serde_json::to_string(&occ).unwrap(), r#"{"Type":2,"Count":1}"#);
    }

    #[test]
    fn test_collapse_settings_gap_alias() {
        let settings: CollapseSettings =
            serde_json::from_str(r#"{"CollapseType": "ERA", "EraGapDays": 30}"#).unwrap();
        assert_eq!(settings.era_gap_days, 30);
        assert_eq!(settings.era_pad_days, 0);
    }

    #[test]
    fn test_endpoint_offset() {
        assert_eq!(Endpoint::before(30).offset(), Some(-30));
        assert_eq!(Endpoint::after(180).offset(), Some(180));
        assert_eq!(Endpoint::unbounded(-1).offset(), None);
    }
}
