//! Cohort plan
//!
//! The dialect-neutral output of compilation. A [`CohortPlan`] holds resolved
//! codesets and fully translated criteria; it no longer refers to anything
//! outside itself, so the SQL emitter and the in-memory executor consume it
//! without access to the vocabulary.
//!
//! Plans serialize to JSON for inspection and snapshotting.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use octofhir_cohort_expression::{
    ConceptId, ConceptSetId, DateField, LimitType, OccurrenceType, RangeOp, TextOp,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::domain::Domain;

// ============================================================================
// Root
// ============================================================================

/// A compiled cohort definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortPlan {
    pub codesets: Vec<ResolvedCodeset>,
    pub primary: PrimaryPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional: Option<GroupPlan>,
    pub inclusion_rules: Vec<RulePlan>,
    pub expression_limit: LimitType,
    pub end_strategy: EndPlan,
    pub censoring: Vec<EventQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub censor_window: Option<CensorWindow>,
    pub collapse: CollapsePlan,
    pub default_event_days: i64,
}

impl CohortPlan {
    pub fn codeset(&self, id: ConceptSetId) -> Option<&ResolvedCodeset> {
        self.codesets.iter().find(|c| c.id == id)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Smallest codeset id referenced anywhere in the plan but not defined by it
    pub fn undefined_codeset(&self) -> Option<ConceptSetId> {
        let mut refs = BTreeSet::new();
        for query in self.primary.events.iter().chain(&self.censoring) {
            query.codeset_refs(&mut refs);
        }
        if let Some(group) = &self.additional {
            group.codeset_refs(&mut refs);
        }
        for rule in &self.inclusion_rules {
            rule.group.codeset_refs(&mut refs);
        }
        if let EndPlan::CustomEra { codeset_id, .. } = self.end_strategy {
            refs.insert(codeset_id);
        }
        refs.into_iter().find(|id| self.codeset(*id).is_none())
    }
}

/// A concept set flattened to concrete concept ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCodeset {
    pub id: ConceptSetId,
    pub name: String,
    pub concepts: BTreeSet<ConceptId>,
}

impl ResolvedCodeset {
    pub fn contains(&self, concept: ConceptId) -> bool {
        self.concepts.contains(&concept)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryPlan {
    /// One query per primary criterion; any one qualifies
    pub events: Vec<EventQuery>,
    pub prior_days: i64,
    pub post_days: i64,
    pub limit: LimitType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePlan {
    pub name: String,
    pub group: GroupPlan,
}

/// How an episode's end date is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EndPlan {
    /// The event's own end date
    Default,
    #[serde(rename_all = "camelCase")]
    DateOffset { field: DateField, offset: i64 },
    /// Drug era containing the start; an optional date offset is applied to the era end afterwards
    #[serde(rename_all = "camelCase")]
    CustomEra {
        codeset_id: ConceptSetId,
        gap_days: i64,
        offset: i64,
        days_supply_override: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date_offset: Option<DateOffsetPlan>,
    },
}

/// Date offset applied after a custom era has set the end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOffsetPlan {
    pub field: DateField,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensorWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapsePlan {
    pub gap_days: i64,
    pub pad_days: i64,
}

// ============================================================================
// Event queries
// ============================================================================

/// Rows of one domain table matching a criterion
///
/// Evaluation order: codeset membership, `first`, `filters`, user-defined
/// period, the correlated group anchored at each row, then the date
/// adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<ConceptSetId>,
    /// Keep only each person's earliest matching row
    #[serde(default)]
    pub first: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_period: Option<UserPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlated: Option<Box<GroupPlan>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_adjustment: Option<DateAdjustmentPlan>,
}

impl EventQuery {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            codeset_id: None,
            first: false,
            filters: Vec::new(),
            user_period: None,
            correlated: None,
            date_adjustment: None,
        }
    }

    /// Codesets referenced by this query and anything nested in it
    pub fn codeset_refs(&self, out: &mut BTreeSet<ConceptSetId>) {
        out.extend(self.codeset_id);
        for filter in &self.filters {
            if let Filter::Codeset { codeset_id, .. } = filter {
                out.insert(*codeset_id);
            }
        }
        if let Some(group) = &self.correlated {
            group.codeset_refs(out);
        }
    }
}

/// Replacement start/end dates for period rows containing them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateAdjustmentPlan {
    pub start_with: DateField,
    pub start_offset: i64,
    pub end_with: DateField,
    pub end_offset: i64,
}

/// Which bound of an event a predicate reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventDate {
    Start,
    End,
}

/// A column reachable from an event row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "table", content = "column", rename_all = "camelCase")]
pub enum Column {
    /// The event's own table
    Event(String),
    /// `person`, joined on `person_id`
    Person(String),
    /// `visit_occurrence`, joined on `visit_occurrence_id`
    Visit(String),
    /// `provider`, joined on `provider_id`
    Provider(String),
    /// `care_site`, joined on `care_site_id`
    CareSite(String),
}

impl Column {
    pub fn event(name: &str) -> Self {
        Self::Event(name.to_string())
    }

    pub fn person(name: &str) -> Self {
        Self::Person(name.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Event(c) | Self::Person(c) | Self::Visit(c) | Self::Provider(c) | Self::CareSite(c) => c,
        }
    }
}

/// Numeric quantity a range constrains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Operand {
    Column { column: Column },
    /// Calendar year of the event date minus year of birth
    Age { at: EventDate },
    /// Days from start to end
    Duration,
    /// `numerator / denominator`, both event columns
    Ratio { numerator: String, denominator: String },
}

/// A row predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Filter {
    /// Column value in (or, with `exclude`, not in) a literal concept list
    Concept {
        column: Column,
        concepts: SmallVec<[ConceptId; 4]>,
        exclude: bool,
    },
    /// Column value in (or not in) a resolved codeset
    #[serde(rename_all = "camelCase")]
    Codeset {
        column: Column,
        codeset_id: ConceptSetId,
        exclude: bool,
    },
    Numeric { operand: Operand, bound: NumericBound },
    Date { at: EventDate, bound: DateBound },
    Text {
        column: Column,
        op: TextOp,
        negated: bool,
        text: String,
    },
    /// Measurement outside its reference range or flagged abnormal
    Abnormal,
}

/// Value concepts flagging a measurement as abnormal
pub const ABNORMAL_VALUE_CONCEPTS: [ConceptId; 2] = [4155142, 4155143];

/// A compiled numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericBound {
    pub op: RangeOp,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<f64>,
}

impl NumericBound {
    pub fn matches(&self, x: f64) -> bool {
        compare(self.op, x, self.value, self.extent)
    }
}

/// A compiled date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBound {
    pub op: RangeOp,
    pub value: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<NaiveDate>,
}

impl DateBound {
    pub fn matches(&self, x: NaiveDate) -> bool {
        compare(self.op, x, self.value, self.extent)
    }
}

/// Range comparison; `bt` bounds are inclusive
fn compare<T: PartialOrd + Copy>(op: RangeOp, x: T, value: T, extent: Option<T>) -> bool {
    let between = |hi: Option<T>| hi.is_some_and(|hi| x >= value && x <= hi);
    match op {
        RangeOp::Lt => x < value,
        RangeOp::Lte => x <= value,
        RangeOp::Eq => x == value,
        RangeOp::NotEq => x != value,
        RangeOp::Gt => x > value,
        RangeOp::Gte => x >= value,
        RangeOp::Between => between(extent),
        RangeOp::NotBetween => !between(extent),
    }
}

/// `LIKE`-style match used by text filters
pub fn text_matches(op: TextOp, negated: bool, text: &str, value: &str) -> bool {
    let hit = match op {
        TextOp::StartsWith => value.starts_with(text),
        TextOp::EndsWith => value.ends_with(text),
        TextOp::Contains => value.contains(text),
    };
    hit != negated
}

// ============================================================================
// Groups
// ============================================================================

/// Boolean operator with its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "count", rename_all = "camelCase")]
pub enum GroupKind {
    All,
    Any,
    AtLeast(u32),
    AtMost(u32),
}

/// A compiled criteria group
///
/// Empty demographic entries and empty nested groups are dropped during
/// compilation, so every child counts toward the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPlan {
    pub kind: GroupKind,
    #[serde(default)]
    pub invert: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CorrelatedPlan>,
    /// Predicates over the index event and its person
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demographics: Vec<DemographicPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupPlan>,
}

impl GroupPlan {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            invert: false,
            criteria: Vec::new(),
            demographics: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.criteria.len() + self.demographics.len() + self.groups.len()
    }

    /// An empty group imposes no constraint
    pub fn is_empty(&self) -> bool {
        self.child_count() == 0
    }

    pub fn codeset_refs(&self, out: &mut BTreeSet<ConceptSetId>) {
        for correlated in &self.criteria {
            correlated.events.codeset_refs(out);
        }
        for demographic in &self.demographics {
            for filter in &demographic.filters {
                if let Filter::Codeset { codeset_id, .. } = filter {
                    out.insert(*codeset_id);
                }
            }
        }
        for group in &self.groups {
            group.codeset_refs(out);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicPlan {
    pub filters: Vec<Filter>,
}

/// Point an endpoint of a window is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    Start,
    End,
}

/// `index[index_anchor] + lower <= event[event_anchor] <= index[index_anchor] + upper`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowPlan {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub index_anchor: Anchor,
    pub event_anchor: Anchor,
}

/// Column counted distinctly by an occurrence constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistinctColumn {
    DomainConcept,
    StartDate,
    EndDate,
    VisitId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrencePlan {
    pub kind: OccurrenceType,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<DistinctColumn>,
}

impl OccurrencePlan {
    pub const fn at_least_one() -> Self {
        Self {
            kind: OccurrenceType::AtLeast,
            count: 1,
            distinct: None,
        }
    }

    /// Whether `n` matching rows satisfy the constraint
    pub fn accepts(&self, n: usize) -> bool {
        let count = self.count as usize;
        match self.kind {
            OccurrenceType::Exactly => n == count,
            OccurrenceType::AtMost => n <= count,
            OccurrenceType::AtLeast => n >= count,
        }
    }
}

/// A criterion correlated with the index event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedPlan {
    pub events: EventQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_window: Option<WindowPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_window: Option<WindowPlan>,
    #[serde(default)]
    pub restrict_visit: bool,
    #[serde(default)]
    pub ignore_observation_period: bool,
    pub occurrence: OccurrencePlan,
}

impl CorrelatedPlan {
    /// Date of a correlated event compared by `window`
    ///
    /// Domains without an end date compare their start on both sides.
    pub fn event_date(&self, window: &WindowPlan) -> EventDate {
        match window.event_anchor {
            Anchor::End if self.events.domain.has_end_date() => EventDate::End,
            _ => EventDate::Start,
        }
    }
}

impl WindowPlan {
    pub fn index_date(&self) -> EventDate {
        match self.index_anchor {
            Anchor::Start => EventDate::Start,
            Anchor::End => EventDate::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RangeOp::Lt, 4.0, true)]
    #[case(RangeOp::Lt, 5.0, false)]
    #[case(RangeOp::Lte, 5.0, true)]
    #[case(RangeOp::Eq, 5.0, true)]
    #[case(RangeOp::NotEq, 5.0, false)]
    #[case(RangeOp::Gt, 6.0, true)]
    #[case(RangeOp::Gte, 5.0, true)]
    #[case(RangeOp::Between, 10.0, true)]
    #[case(RangeOp::Between, 10.5, false)]
    #[case(RangeOp::NotBetween, 4.0, true)]
    #[case(RangeOp::NotBetween, 7.0, false)]
    fn test_numeric_bound(#[case] op: RangeOp, #[case] x: f64, #[case] expected: bool) {
        let bound = NumericBound {
            op,
            value: 5.0,
            extent: Some(10.0),
        };
        assert_eq!(bound.matches(x), expected);
    }

    #[test]
    fn test_date_bound_between_is_inclusive() {
        let day = |d| NaiveDate::from_ymd_opt(2020, 1, d).unwrap();
        let bound = DateBound {
            op: RangeOp::Between,
            value: day(1),
            extent: Some(day(31)),
        };
        assert!(bound.matches(day(1)));
        assert!(bound.matches(day(31)));
        assert!(!bound.matches(NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()));
    }

    #[test]
    fn test_text_matches() {
        assert!(text_matches(TextOp::StartsWith, false, "AB", "ABC"));
        assert!(!text_matches(TextOp::StartsWith, true, "AB", "ABC"));
        assert!(text_matches(TextOp::Contains, true, "x", "ABC"));
        assert!(text_matches(TextOp::EndsWith, false, "BC", "ABC"));
    }

    #[test]
    fn test_occurrence_accepts() {
        assert!(OccurrencePlan::at_least_one().accepts(1));
        assert!(!OccurrencePlan::at_least_one().accepts(0));
        let exactly = OccurrencePlan {
            kind: OccurrenceType::Exactly,
            count: 0,
            distinct: None,
        };
        assert!(exactly.accepts(0));
        assert!(!exactly.accepts(1));
    }

    #[test]
    fn test_event_date_without_end_column() {
        let window = WindowPlan {
            lower: Some(0),
            upper: None,
            index_anchor: Anchor::End,
            event_anchor: Anchor::End,
        };
        let correlated = |domain| CorrelatedPlan {
            events: EventQuery::new(domain),
            start_window: Some(window),
            end_window: None,
            restrict_visit: false,
            ignore_observation_period: false,
            occurrence: OccurrencePlan::at_least_one(),
        };
        assert_eq!(correlated(Domain::DrugExposure).event_date(&window), EventDate::End);
        assert_eq!(correlated(Domain::Measurement).event_date(&window), EventDate::Start);
        assert_eq!(window.index_date(), EventDate::End);
    }
}
