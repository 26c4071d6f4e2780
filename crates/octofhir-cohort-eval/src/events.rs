//! Event queries and row filters
//!
//! [`Evaluator`] indexes the lookup tables of a warehouse once and evaluates
//! event queries against it. Filter semantics follow SQL three-valued logic:
//! a null operand never satisfies a comparison, while an excluded concept
//! list accepts null.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};
use octofhir_cohort_compiler::domain::PERSON_ID;
use octofhir_cohort_compiler::{
    ABNORMAL_VALUE_CONCEPTS, CohortPlan, Column, EventDate, EventQuery, Filter, Operand, text_matches,
};
use octofhir_cohort_expression::{ConceptId, ConceptSetId, DateField};

use crate::eras::shift;
use crate::error::{ExecResult, ExecutionError};
use crate::value::Value;
use crate::warehouse::{InMemoryWarehouse, Row, required_date, required_id};

static NULL: Value = Value::Null;

/// A row matched by an event query, in the shape every stage shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub person_id: i64,
    pub event_id: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub visit_occurrence_id: Option<i64>,
    pub concept_id: Option<ConceptId>,
}

impl Event {
    pub fn date(&self, at: EventDate) -> NaiveDate {
        match at {
            EventDate::Start => self.start,
            EventDate::End => self.end,
        }
    }
}

/// An event serving as the anchor of criteria groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEvent {
    pub event: Event,
    /// Observation period containing the event start
    pub period: Option<(NaiveDate, NaiveDate)>,
}

/// What a filter sees of the row it constrains
pub(crate) struct Scope<'r> {
    pub row: Option<&'r Row>,
    pub person_id: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub visit_occurrence_id: Option<i64>,
}

impl Scope<'_> {
    fn date(&self, at: EventDate) -> NaiveDate {
        match at {
            EventDate::Start => self.start,
            EventDate::End => self.end,
        }
    }

    fn cell(&self, column: &str) -> &Value {
        self.row.map_or(&NULL, |row| row.get(column))
    }
}

pub struct Evaluator<'w> {
    warehouse: &'w InMemoryWarehouse,
    codesets: HashMap<ConceptSetId, &'w BTreeSet<ConceptId>>,
    default_event_days: i64,
    persons: HashMap<i64, &'w Row>,
    visits: HashMap<i64, &'w Row>,
    providers: HashMap<i64, &'w Row>,
    care_sites: HashMap<i64, &'w Row>,
    /// Observation periods per person, sorted by start
    periods: HashMap<i64, Vec<(NaiveDate, NaiveDate)>>,
}

impl<'w> Evaluator<'w> {
    pub fn new(warehouse: &'w InMemoryWarehouse, plan: &'w CohortPlan) -> ExecResult<Self> {
        if let Some(id) = plan.undefined_codeset() {
            return Err(ExecutionError::UnknownCodeset { id });
        }
        let codesets = plan.codesets.iter().map(|c| (c.id, &c.concepts)).collect();

        let mut periods: HashMap<i64, Vec<(NaiveDate, NaiveDate)>> = HashMap::new();
        for (i, row) in warehouse.require("observation_period")?.iter().enumerate() {
            let person_id = required_id(row, "observation_period", i, PERSON_ID)?;
            let start = required_date(row, "observation_period", i, "observation_period_start_date")?;
            let end = required_date(row, "observation_period", i, "observation_period_end_date")?;
            periods.entry(person_id).or_default().push((start, end));
        }
        for spans in periods.values_mut() {
            spans.sort_unstable();
        }

        Ok(Self {
            warehouse,
            codesets,
            default_event_days: plan.default_event_days,
            persons: index_by(warehouse.require("person")?, PERSON_ID),
            visits: index_by(warehouse.rows("visit_occurrence"), "visit_occurrence_id"),
            providers: index_by(warehouse.rows("provider"), "provider_id"),
            care_sites: index_by(warehouse.rows("care_site"), "care_site_id"),
            periods,
        })
    }

    pub fn warehouse(&self) -> &'w InMemoryWarehouse {
        self.warehouse
    }

    pub fn in_codeset(&self, id: ConceptSetId, value: &Value) -> bool {
        match (self.codesets.get(&id), value.as_i64()) {
            (Some(concepts), Some(concept)) => concepts.contains(&concept),
            _ => false,
        }
    }

    /// First observation period of the person satisfying `accept`
    pub fn period_where(
        &self,
        person_id: i64,
        accept: impl Fn(NaiveDate, NaiveDate) -> bool,
    ) -> Option<(NaiveDate, NaiveDate)> {
        self.periods
            .get(&person_id)?
            .iter()
            .copied()
            .find(|(start, end)| accept(*start, *end))
    }

    pub fn period_containing(&self, person_id: i64, date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.period_where(person_id, |start, end| start <= date && date <= end)
    }

    pub fn index(&self, event: Event) -> IndexEvent {
        let period = self.period_containing(event.person_id, event.start);
        IndexEvent { event, period }
    }

    /// Rows matching `query`, with its correlated group and date adjustment applied
    pub fn events(&self, query: &EventQuery) -> ExecResult<Vec<Event>> {
        let table = query.domain.table();
        let key = table.primary_key.unwrap_or(PERSON_ID);

        let mut candidates = Vec::new();
        for (i, row) in self.warehouse.rows(table.table).iter().enumerate() {
            if let (Some(id), Some(column)) = (query.codeset_id, table.concept) {
                if !self.in_codeset(id, row.get(column)) {
                    continue;
                }
            }
            let person_id = required_id(row, table.table, i, PERSON_ID)?;
            let event_id = required_id(row, table.table, i, key)?;
            let start = required_date(row, table.table, i, table.start_date)?;
            candidates.push((row, person_id, event_id, start));
        }

        if query.first {
            let mut earliest: BTreeMap<i64, (&Row, i64, i64, NaiveDate)> = BTreeMap::new();
            for candidate in candidates {
                let (_, person_id, event_id, start) = candidate;
                earliest
                    .entry(person_id)
                    .and_modify(|kept| {
                        if (start, event_id) < (kept.3, kept.2) {
                            *kept = candidate;
                        }
                    })
                    .or_insert(candidate);
            }
            candidates = earliest.into_values().collect();
        }

        let mut events = Vec::new();
        for (row, person_id, event_id, start) in candidates {
            let end = table
                .end_date
                .and_then(|column| row.get(column).as_date())
                .unwrap_or_else(|| shift(start, self.default_event_days));
            let scope = Scope {
                row: Some(row),
                person_id,
                start,
                end,
                visit_occurrence_id: row.get("visit_occurrence_id").as_i64(),
            };
            if !query.filters.iter().all(|f| self.matches(f, &scope)) {
                continue;
            }

            let (mut start_out, mut end_out) = (start, end);
            if let Some(period) = &query.user_period {
                let contains = |date: NaiveDate| start <= date && date <= end;
                if period.start.is_some_and(|d| !contains(d)) || period.end.is_some_and(|d| !contains(d)) {
                    continue;
                }
                start_out = period.start.unwrap_or(start);
                end_out = period.end.unwrap_or(end);
            }

            events.push(Event {
                person_id,
                event_id,
                start: start_out,
                end: end_out,
                visit_occurrence_id: table.visit.and_then(|c| row.get(c).as_i64()),
                concept_id: table.concept.and_then(|c| row.get(c).as_i64()),
            });
        }

        if let Some(group) = &query.correlated {
            let index: Vec<IndexEvent> = events.into_iter().map(|e| self.index(e)).collect();
            let accepted = self.group(group, &index)?;
            events = index
                .into_iter()
                .zip(accepted)
                .filter_map(|(i, ok)| ok.then_some(i.event))
                .collect();
        }

        if let Some(adjustment) = &query.date_adjustment {
            for event in &mut events {
                let field = |f: DateField| match f {
                    DateField::StartDate => event.start,
                    DateField::EndDate => event.end,
                };
                let start = shift(field(adjustment.start_with), adjustment.start_offset);
                let end = shift(field(adjustment.end_with), adjustment.end_offset);
                event.start = start;
                event.end = end;
            }
        }
        Ok(events)
    }

    pub(crate) fn matches(&self, filter: &Filter, scope: &Scope<'_>) -> bool {
        match filter {
            Filter::Concept {
                column,
                concepts,
                exclude,
            } => {
                let value = self.column(column, scope).as_i64();
                if *exclude {
                    value.is_none_or(|v| !concepts.contains(&v))
                } else {
                    value.is_some_and(|v| concepts.contains(&v))
                }
            }
            Filter::Codeset {
                column,
                codeset_id,
                exclude,
            } => {
                let value = self.column(column, scope);
                if *exclude {
                    value.is_null() || !self.in_codeset(*codeset_id, value)
                } else {
                    self.in_codeset(*codeset_id, value)
                }
            }
            Filter::Numeric { operand, bound } => self.operand(operand, scope).is_some_and(|x| bound.matches(x)),
            Filter::Date { at, bound } => bound.matches(scope.date(*at)),
            Filter::Text {
                column,
                op,
                negated,
                text,
            } => self
                .column(column, scope)
                .as_str()
                .is_some_and(|value| text_matches(*op, *negated, text, value)),
            Filter::Abnormal => {
                let number = scope.cell("value_as_number").as_f64();
                let low = scope.cell("range_low").as_f64();
                let high = scope.cell("range_high").as_f64();
                let flagged = scope
                    .cell("value_as_concept_id")
                    .as_i64()
                    .is_some_and(|c| ABNORMAL_VALUE_CONCEPTS.contains(&c));
                let below = matches!((number, low), (Some(n), Some(l)) if n < l);
                let above = matches!((number, high), (Some(n), Some(h)) if n > h);
                below || above || flagged
            }
        }
    }

    fn operand(&self, operand: &Operand, scope: &Scope<'_>) -> Option<f64> {
        match operand {
            Operand::Column { column } => self.column(column, scope).as_f64(),
            Operand::Age { at } => {
                let born = self.persons.get(&scope.person_id)?.get("year_of_birth").as_i64()?;
                Some((i64::from(scope.date(*at).year()) - born) as f64)
            }
            Operand::Duration => Some((scope.end - scope.start).num_days() as f64),
            Operand::Ratio {
                numerator,
                denominator,
            } => {
                let numerator = scope.cell(numerator).as_f64()?;
                let denominator = scope.cell(denominator).as_f64()?;
                (denominator != 0.0).then(|| numerator / denominator)
            }
        }
    }

    fn column<'s>(&'s self, column: &Column, scope: &'s Scope<'_>) -> &'s Value {
        match column {
            Column::Event(name) => scope.cell(name),
            Column::Person(name) => lookup(&self.persons, Some(scope.person_id), name),
            Column::Visit(name) => lookup(&self.visits, scope.visit_occurrence_id, name),
            Column::Provider(name) => lookup(&self.providers, scope.cell("provider_id").as_i64(), name),
            Column::CareSite(name) => lookup(&self.care_sites, scope.cell("care_site_id").as_i64(), name),
        }
    }
}

/// Column of the row keyed by `id`; null when there is no such row
fn lookup<'w>(rows: &HashMap<i64, &'w Row>, id: Option<i64>, column: &str) -> &'w Value {
    match id.and_then(|id| rows.get(&id)) {
        Some(&row) => row.get(column),
        None => &NULL,
    }
}

fn index_by<'w>(rows: &'w [Row], key: &str) -> HashMap<i64, &'w Row> {
    rows.iter()
        .filter_map(|row| row.get(key).as_i64().map(|id| (id, row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cohort_compiler::{CollapsePlan, DateAdjustmentPlan, Domain, EndPlan, NumericBound, PrimaryPlan, ResolvedCodeset};
    use octofhir_cohort_expression::{LimitType, RangeOp, TextOp};
    use serde_json::json;
    use smallvec::smallvec;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn plan() -> CohortPlan {
        CohortPlan {
            codesets: vec![ResolvedCodeset {
                id: 0,
                name: "bp".to_string(),
                concepts: [3004249].into_iter().collect(),
            }],
            primary: PrimaryPlan {
                events: Vec::new(),
                prior_days: 0,
                post_days: 0,
                limit: LimitType::All,
            },
            additional: None,
            inclusion_rules: Vec::new(),
            expression_limit: LimitType::All,
            end_strategy: EndPlan::Default,
            censoring: Vec::new(),
            censor_window: None,
            collapse: CollapsePlan::default(),
            default_event_days: 1,
        }
    }

    fn warehouse() -> InMemoryWarehouse {
        InMemoryWarehouse::from_value(&json!({
            "person": [{"person_id": 1, "year_of_birth": 1950}, {"person_id": 2, "year_of_birth": 2001}],
            "observation_period": [
                {"person_id": 1, "observation_period_start_date": "2000-01-01", "observation_period_end_date": "2030-01-01"}
            ],
            "measurement": [
                {"measurement_id": 10, "person_id": 1, "measurement_date": "2020-03-01", "measurement_concept_id": 3004249,
                 "value_as_number": 180, "range_low": 90, "range_high": 140, "unit_source_value": "mmHg"},
                {"measurement_id": 11, "person_id": 1, "measurement_date": "2020-01-01", "measurement_concept_id": 3004249,
                 "value_as_number": 120, "range_low": 90, "range_high": 140},
                {"measurement_id": 12, "person_id": 2, "measurement_date": "2020-02-01", "measurement_concept_id": 3004249},
                {"measurement_id": 13, "person_id": 2, "measurement_date": "2020-02-01", "measurement_concept_id": 1}
            ]
        }))
        .unwrap()
    }

    fn query() -> EventQuery {
        let mut query = EventQuery::new(Domain::Measurement);
        query.codeset_id = Some(0);
        query
    }

    #[test]
    fn test_codeset_and_default_end() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let events = evaluator.events(&query()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].end, day("2020-03-02"));
        assert_eq!(events[0].concept_id, Some(3004249));
    }

    #[test]
    fn test_first_precedes_filters() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let mut query = query();
        query.first = true;
        query.filters.push(Filter::Abnormal);
        // person 1's first measurement is normal and person 2's has no value
        assert!(evaluator.events(&query).unwrap().is_empty());

        query.first = false;
        let events = evaluator.events(&query).unwrap();
        assert_eq!(events.iter().map(|e| e.event_id).collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_null_semantics() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let mut query = query();
        query.filters.push(Filter::Numeric {
            operand: Operand::Column {
                column: Column::event("value_as_number"),
            },
            bound: NumericBound {
                op: RangeOp::NotBetween,
                value: 0.0,
                extent: Some(100.0),
            },
        });
        let ids: Vec<_> = evaluator.events(&query).unwrap().iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![10, 11]);

        let mut query = self::query();
        query.filters.push(Filter::Text {
            column: Column::event("unit_source_value"),
            op: TextOp::Contains,
            negated: true,
            text: "kg".to_string(),
        });
        let ids: Vec<_> = evaluator.events(&query).unwrap().iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![10]);
    }

    #[test]
    fn test_person_columns_and_age() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let mut query = query();
        query.filters.push(Filter::Numeric {
            operand: Operand::Age { at: EventDate::Start },
            bound: NumericBound {
                op: RangeOp::Gte,
                value: 65.0,
                extent: None,
            },
        });
        query.filters.push(Filter::Concept {
            column: Column::person("gender_concept_id"),
            concepts: smallvec![8532],
            exclude: true,
        });
        let ids: Vec<_> = evaluator.events(&query).unwrap().iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn test_date_adjustment() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let mut query = query();
        query.date_adjustment = Some(DateAdjustmentPlan {
            start_with: DateField::EndDate,
            start_offset: -7,
            end_with: DateField::StartDate,
            end_offset: 30,
        });
        let event = &evaluator.events(&query).unwrap()[0];
        assert_eq!(event.start, day("2020-02-24"));
        assert_eq!(event.end, day("2020-03-31"));
    }

    #[test]
    fn test_missing_required_table() {
        let warehouse = InMemoryWarehouse::from_value(&json!({"person": []})).unwrap();
        let plan = plan();
        let err = Evaluator::new(&warehouse, &plan).err().unwrap();
        assert_eq!(err, ExecutionError::MissingTable {
            table: "observation_period".to_string()
        });
    }
}
