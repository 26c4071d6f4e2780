//! Plan execution
//!
//! [`CohortExecutor`] runs the same stages as the emitted SQL, in the same
//! order, so both paths produce identical eras for identical data:
//!
//! 1. primary events inside the observation window, numbered in
//!    `(person, start, end, criterion, row id)` order
//! 2. primary limit, additional criteria
//! 3. inclusion rules with attrition, expression limit
//! 4. end strategy, censoring, censor window
//! 5. padding and era collapse

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use log::{debug, info};
use octofhir_cohort_compiler::domain::PERSON_ID;
use octofhir_cohort_compiler::{CohortPlan, EndPlan};
use octofhir_cohort_diagnostics::Result;
use octofhir_cohort_expression::{ConceptSetId, DateField, LimitType};

use crate::eras::{merge_eras, shift};
use crate::error::ExecResult;
use crate::events::{Evaluator, IndexEvent};
use crate::result::{AttritionRecord, CohortEra, CohortResult};
use crate::warehouse::{InMemoryWarehouse, required_date, required_id};

const DRUG_EXPOSURE: &str = "drug_exposure";

/// An index event once its end is final
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Episode {
    person_id: i64,
    start: NaiveDate,
    end: NaiveDate,
}

/// Runs [`CohortPlan`]s against an [`InMemoryWarehouse`]
#[derive(Debug, Clone, Copy)]
pub struct CohortExecutor<'w> {
    warehouse: &'w InMemoryWarehouse,
}

impl<'w> CohortExecutor<'w> {
    pub fn new(warehouse: &'w InMemoryWarehouse) -> Self {
        Self { warehouse }
    }

    pub fn execute(&self, plan: &CohortPlan) -> Result<CohortResult> {
        Ok(self.run(plan)?)
    }

    fn run(&self, plan: &CohortPlan) -> ExecResult<CohortResult> {
        let evaluator = Evaluator::new(self.warehouse, plan)?;

        let primary = primary_events(&evaluator, plan)?;
        debug!("primary events: {}", primary.len());
        let mut current = limit(primary, plan.primary.limit);

        if let Some(group) = &plan.additional {
            current = retain(&evaluator.group(group, &current)?, current);
            debug!("after additional criteria: {}", current.len());
        }

        let mut attrition = Vec::with_capacity(plan.inclusion_rules.len());
        let mut surviving = vec![true; current.len()];
        for (k, rule) in plan.inclusion_rules.iter().enumerate() {
            let hits = evaluator.group(&rule.group, &current)?;
            for (alive, hit) in surviving.iter_mut().zip(hits) {
                *alive &= hit;
            }
            let persons: HashSet<i64> = current
                .iter()
                .zip(&surviving)
                .filter_map(|(e, alive)| alive.then_some(e.event.person_id))
                .collect();
            attrition.push(AttritionRecord {
                rule_index: k,
                rule_name: rule.name.clone(),
                surviving_count: surviving.iter().filter(|alive| **alive).count(),
                surviving_persons: persons.len(),
            });
            debug!("rule {k} '{}': {} events left", rule.name, attrition[k].surviving_count);
        }
        current = retain(&surviving, current);
        current = limit(current, plan.expression_limit);

        let mut episodes = end_strategy(&evaluator, plan, &current)?;
        censor(&evaluator, plan, &mut episodes)?;
        if let Some(window) = plan.censor_window {
            episodes.retain(|e| window.start.is_none_or(|s| e.start >= s) && window.end.is_none_or(|d| e.end <= d));
        }

        let pad = plan.collapse.pad_days;
        let mut spans: BTreeMap<i64, Vec<(NaiveDate, NaiveDate)>> = BTreeMap::new();
        for episode in &episodes {
            spans
                .entry(episode.person_id)
                .or_default()
                .push((shift(episode.start, -pad), shift(episode.end, pad)));
        }
        let eras: Vec<CohortEra> = spans
            .into_iter()
            .flat_map(|(subject_id, spans)| {
                merge_eras(spans, plan.collapse.gap_days)
                    .into_iter()
                    .map(move |(start, end)| CohortEra {
                        subject_id,
                        cohort_start_date: start,
                        cohort_end_date: end,
                    })
            })
            .collect();

        info!(
            "cohort executed: {} episodes, {} eras, {} subjects",
            episodes.len(),
            eras.len(),
            eras.iter().map(|e| e.subject_id).collect::<HashSet<_>>().len()
        );
        Ok(CohortResult { eras, attrition })
    }
}

/// Union of the primary criteria inside the observation window, numbered from 1
fn primary_events(evaluator: &Evaluator<'_>, plan: &CohortPlan) -> ExecResult<Vec<IndexEvent>> {
    let (prior, post) = (plan.primary.prior_days, plan.primary.post_days);
    let mut union = Vec::new();
    for (k, query) in plan.primary.events.iter().enumerate() {
        for event in evaluator.events(query)? {
            let period = evaluator.period_where(event.person_id, |op_start, op_end| {
                event.start >= shift(op_start, prior) && event.start <= shift(op_end, -post)
            });
            if let Some(period) = period {
                union.push((k, IndexEvent {
                    event,
                    period: Some(period),
                }));
            }
        }
    }

    union.sort_by_key(|(k, i)| (i.event.person_id, i.event.start, i.event.end, *k, i.event.event_id));
    Ok(union
        .into_iter()
        .zip(1..)
        .map(|((_, mut index), event_id)| {
            index.event.event_id = event_id;
            index
        })
        .collect())
}

/// Keep one event per person when `limit` asks for it
fn limit(events: Vec<IndexEvent>, limit: LimitType) -> Vec<IndexEvent> {
    let later = match limit {
        LimitType::All => return events,
        LimitType::First => false,
        LimitType::Last => true,
    };
    let mut kept: BTreeMap<i64, IndexEvent> = BTreeMap::new();
    for index in events {
        let key = (index.event.start, index.event.event_id);
        match kept.get(&index.event.person_id) {
            Some(other) if ((other.event.start, other.event.event_id) < key) != later => {}
            _ => {
                kept.insert(index.event.person_id, index);
            }
        }
    }
    let mut events: Vec<_> = kept.into_values().collect();
    events.sort_by_key(|i| i.event.event_id);
    events
}

fn retain(flags: &[bool], events: Vec<IndexEvent>) -> Vec<IndexEvent> {
    events
        .into_iter()
        .zip(flags)
        .filter_map(|(event, keep)| keep.then_some(event))
        .collect()
}

fn end_strategy(evaluator: &Evaluator<'_>, plan: &CohortPlan, events: &[IndexEvent]) -> ExecResult<Vec<Episode>> {
    let clamp = |index: &IndexEvent, end: NaiveDate| index.period.map_or(end, |(_, op_end)| end.min(op_end));
    let episode = |index: &IndexEvent, end: NaiveDate| Episode {
        person_id: index.event.person_id,
        start: index.event.start,
        end,
    };

    let offset_end = |start: NaiveDate, end: NaiveDate, field: DateField, offset: i64| match field {
        DateField::StartDate => shift(start, offset),
        DateField::EndDate => shift(end, offset),
    };

    match plan.end_strategy {
        EndPlan::Default => Ok(events.iter().map(|i| episode(i, i.event.end)).collect()),
        EndPlan::DateOffset { field, offset } => Ok(events
            .iter()
            .map(|i| episode(i, clamp(i, offset_end(i.event.start, i.event.end, field, offset))))
            .collect()),
        EndPlan::CustomEra {
            codeset_id,
            gap_days,
            offset,
            days_supply_override,
            date_offset,
        } => {
            let eras = drug_eras(evaluator, codeset_id, gap_days, days_supply_override)?;
            Ok(events
                .iter()
                .filter_map(|i| {
                    let start = i.event.start;
                    let era_end = eras
                        .get(&i.event.person_id)?
                        .iter()
                        .map(|(era_start, era_end)| (*era_start, shift(*era_end, offset)))
                        .filter(|(era_start, era_end)| *era_start <= start && start <= *era_end)
                        .map(|(_, era_end)| era_end)
                        .min()?;
                    let end = match date_offset {
                        Some(d) => offset_end(start, clamp(i, era_end), d.field, d.offset),
                        None => era_end,
                    };
                    Some(episode(i, clamp(i, end)))
                })
                .collect())
        }
    }
}

/// Exposure eras per person for the drugs of a codeset
fn drug_eras(
    evaluator: &Evaluator<'_>,
    codeset_id: ConceptSetId,
    gap_days: i64,
    days_supply_override: Option<i64>,
) -> ExecResult<HashMap<i64, Vec<(NaiveDate, NaiveDate)>>> {
    let mut exposures: HashMap<i64, Vec<(NaiveDate, NaiveDate)>> = HashMap::new();
    for (i, row) in evaluator.warehouse().rows(DRUG_EXPOSURE).iter().enumerate() {
        let member = evaluator.in_codeset(codeset_id, row.get("drug_concept_id"))
            || evaluator.in_codeset(codeset_id, row.get("drug_source_concept_id"));
        if !member {
            continue;
        }
        let person_id = required_id(row, DRUG_EXPOSURE, i, PERSON_ID)?;
        let start = required_date(row, DRUG_EXPOSURE, i, "drug_exposure_start_date")?;
        let end = match days_supply_override {
            Some(days) => shift(start, days),
            None => row
                .get("drug_exposure_end_date")
                .as_date()
                .or_else(|| row.get("days_supply").as_i64().map(|days| shift(start, days)))
                .unwrap_or_else(|| shift(start, 1)),
        };
        exposures.entry(person_id).or_default().push((start, end));
    }
    debug!("custom era exposures for {} persons", exposures.len());
    Ok(exposures
        .into_iter()
        .map(|(person_id, spans)| (person_id, merge_eras(spans, gap_days)))
        .collect())
}

/// End each episode at the first censoring event on or after its start
fn censor(evaluator: &Evaluator<'_>, plan: &CohortPlan, episodes: &mut [Episode]) -> ExecResult<()> {
    if plan.censoring.is_empty() {
        return Ok(());
    }
    let mut censors: HashMap<i64, Vec<NaiveDate>> = HashMap::new();
    for query in &plan.censoring {
        for event in evaluator.events(query)? {
            censors.entry(event.person_id).or_default().push(event.start);
        }
    }
    for episode in episodes {
        let first = censors
            .get(&episode.person_id)
            .and_then(|dates| dates.iter().filter(|d| **d >= episode.start).min());
        if let Some(&date) = first {
            if date < episode.end {
                episode.end = date;
            }
        }
    }
    Ok(())
}
