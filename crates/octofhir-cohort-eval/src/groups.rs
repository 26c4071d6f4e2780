//! Criteria group evaluation
//!
//! A group is evaluated against a slice of index events at once and yields
//! one flag per index event. Correlated criteria run their event query once
//! per group, not once per index event.

use std::collections::{HashMap, HashSet};

use octofhir_cohort_compiler::{CorrelatedPlan, DemographicPlan, DistinctColumn, GroupPlan};

use crate::eras::shift;
use crate::error::ExecResult;
use crate::events::{Evaluator, Event, IndexEvent, Scope};

impl Evaluator<'_> {
    /// Whether `group` accepts each of `index`
    pub fn group(&self, group: &GroupPlan, index: &[IndexEvent]) -> ExecResult<Vec<bool>> {
        let mut children = Vec::with_capacity(group.child_count());
        for correlated in &group.criteria {
            children.push(self.correlated(correlated, index)?);
        }
        for demographic in &group.demographics {
            children.push(self.demographic(demographic, index));
        }
        for nested in &group.groups {
            children.push(self.group(nested, index)?);
        }

        let mut flags = Vec::with_capacity(children.len());
        Ok((0..index.len())
            .map(|i| {
                flags.clear();
                flags.extend(children.iter().map(|child| child[i]));
                group.evaluate(&flags)
            })
            .collect())
    }

    fn correlated(&self, correlated: &CorrelatedPlan, index: &[IndexEvent]) -> ExecResult<Vec<bool>> {
        let events = self.events(&correlated.events)?;
        let mut by_person: HashMap<i64, Vec<&Event>> = HashMap::new();
        for event in &events {
            by_person.entry(event.person_id).or_default().push(event);
        }

        Ok(index
            .iter()
            .map(|anchor| {
                let candidates = by_person.get(&anchor.event.person_id).map(Vec::as_slice).unwrap_or_default();
                let matched = candidates.iter().filter(|e| related(correlated, anchor, e));
                let count = match correlated.occurrence.distinct {
                    None => matched.count(),
                    Some(column) => {
                        let mut seen = HashSet::new();
                        for event in matched {
                            if let Some(key) = distinct_key(column, event) {
                                seen.insert(key);
                            }
                        }
                        seen.len()
                    }
                };
                correlated.occurrence.accepts(count)
            })
            .collect())
    }

    fn demographic(&self, demographic: &DemographicPlan, index: &[IndexEvent]) -> Vec<bool> {
        index
            .iter()
            .map(|anchor| {
                let scope = Scope {
                    row: None,
                    person_id: anchor.event.person_id,
                    start: anchor.event.start,
                    end: anchor.event.end,
                    visit_occurrence_id: anchor.event.visit_occurrence_id,
                };
                demographic.filters.iter().all(|f| self.matches(f, &scope))
            })
            .collect()
    }
}

/// Whether `event` falls in the windows of `correlated` around `anchor`
fn related(correlated: &CorrelatedPlan, anchor: &IndexEvent, event: &Event) -> bool {
    for window in [correlated.start_window, correlated.end_window].iter().flatten() {
        let date = event.date(correlated.event_date(window));
        let origin = anchor.event.date(window.index_date());
        if window.lower.is_some_and(|lower| date < shift(origin, lower)) {
            return false;
        }
        if window.upper.is_some_and(|upper| date > shift(origin, upper)) {
            return false;
        }
    }
    if !correlated.ignore_observation_period {
        match anchor.period {
            Some((start, end)) if start <= event.start && event.start <= end => {}
            _ => return false,
        }
    }
    if correlated.restrict_visit {
        match (event.visit_occurrence_id, anchor.event.visit_occurrence_id) {
            (Some(a), Some(b)) if a == b => {}
            _ => return false,
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DistinctKey {
    Id(i64),
    Date(chrono::NaiveDate),
}

fn distinct_key(column: DistinctColumn, event: &Event) -> Option<DistinctKey> {
    match column {
        DistinctColumn::DomainConcept => event.concept_id.map(DistinctKey::Id),
        DistinctColumn::StartDate => Some(DistinctKey::Date(event.start)),
        DistinctColumn::EndDate => Some(DistinctKey::Date(event.end)),
        DistinctColumn::VisitId => event.visit_occurrence_id.map(DistinctKey::Id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use octofhir_cohort_compiler::{
        Anchor, CohortPlan, CollapsePlan, Domain, EndPlan, EventQuery, GroupKind, OccurrencePlan, PrimaryPlan,
        ResolvedCodeset, WindowPlan,
    };
    use octofhir_cohort_expression::{LimitType, OccurrenceType};
    use serde_json::json;

    use crate::warehouse::InMemoryWarehouse;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn plan() -> CohortPlan {
        CohortPlan {
            codesets: vec![ResolvedCodeset {
                id: 1,
                name: "drugs".to_string(),
                concepts: [100, 200].into_iter().collect(),
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
            "person": [{"person_id": 1, "year_of_birth": 1960, "gender_concept_id": 8507}],
            "observation_period": [
                {"person_id": 1, "observation_period_start_date": "2019-01-01", "observation_period_end_date": "2021-12-31"}
            ],
            "drug_exposure": [
                {"drug_exposure_id": 1, "person_id": 1, "drug_concept_id": 100, "visit_occurrence_id": 7,
                 "drug_exposure_start_date": "2020-01-10", "drug_exposure_end_date": "2020-01-20"},
                {"drug_exposure_id": 2, "person_id": 1, "drug_concept_id": 100,
                 "drug_exposure_start_date": "2020-02-01", "drug_exposure_end_date": "2020-02-10"},
                {"drug_exposure_id": 3, "person_id": 1, "drug_concept_id": 200,
                 "drug_exposure_start_date": "2022-06-01", "drug_exposure_end_date": "2022-06-10"}
            ]
        }))
        .unwrap()
    }

    fn anchor(start: &str, visit: Option<i64>) -> IndexEvent {
        IndexEvent {
            event: Event {
                person_id: 1,
                event_id: 1,
                start: day(start),
                end: day(start),
                visit_occurrence_id: visit,
                concept_id: None,
            },
            period: Some((day("2019-01-01"), day("2021-12-31"))),
        }
    }

    fn drugs(lower: Option<i64>, upper: Option<i64>) -> CorrelatedPlan {
        let mut events = EventQuery::new(Domain::DrugExposure);
        events.codeset_id = Some(1);
        CorrelatedPlan {
            events,
            start_window: Some(WindowPlan {
                lower,
                upper,
                index_anchor: Anchor::Start,
                event_anchor: Anchor::Start,
            }),
            end_window: None,
            restrict_visit: false,
            ignore_observation_period: false,
            occurrence: OccurrencePlan::at_least_one(),
        }
    }

    fn group_of(correlated: CorrelatedPlan) -> GroupPlan {
        let mut group = GroupPlan::new(GroupKind::All);
        group.criteria.push(correlated);
        group
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let group = group_of(drugs(Some(0), Some(9)));
        let index = [anchor("2020-01-01", None), anchor("2020-01-11", None), anchor("2020-02-01", None)];
        assert_eq!(evaluator.group(&group, &index).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_observation_period_excludes_late_events() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let mut correlated = drugs(Some(0), None);
        correlated.occurrence = OccurrencePlan {
            kind: OccurrenceType::Exactly,
            count: 2,
            distinct: None,
        };
        let index = [anchor("2020-01-01", None)];
        assert_eq!(evaluator.group(&group_of(correlated.clone()), &index).unwrap(), vec![true]);

        correlated.ignore_observation_period = true;
        assert_eq!(evaluator.group(&group_of(correlated), &index).unwrap(), vec![false]);
    }

    #[test]
    fn test_distinct_concepts_and_visit() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let mut correlated = drugs(None, None);
        correlated.ignore_observation_period = true;
        correlated.occurrence = OccurrencePlan {
            kind: OccurrenceType::AtLeast,
            count: 2,
            distinct: Some(DistinctColumn::DomainConcept),
        };
        let index = [anchor("2020-01-01", Some(7))];
        assert_eq!(evaluator.group(&group_of(correlated.clone()), &index).unwrap(), vec![true]);

        correlated.restrict_visit = true;
        correlated.occurrence.count = 1;
        assert_eq!(evaluator.group(&group_of(correlated.clone()), &index).unwrap(), vec![true]);
        assert_eq!(evaluator.group(&group_of(correlated), &[anchor("2020-01-01", None)]).unwrap(), vec![false]);
    }

    #[test]
    fn test_inverted_and_empty_groups() {
        let (warehouse, plan) = (warehouse(), plan());
        let evaluator = Evaluator::new(&warehouse, &plan).unwrap();
        let index = [anchor("2020-01-01", None), anchor("2021-06-01", None)];

        let mut empty = GroupPlan::new(GroupKind::Any);
        empty.invert = true;
        assert_eq!(evaluator.group(&empty, &index).unwrap(), vec![true, true]);

        let mut group = group_of(drugs(Some(0), Some(60)));
        group.invert = true;
        assert_eq!(evaluator.group(&group, &index).unwrap(), vec![false, true]);
    }
}
