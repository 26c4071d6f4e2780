//! Cohort query assembly
//!
//! [`SqlEmitter`] lays the plan out as one CTE chain, stage by stage:
//!
//! 1. `codesets`, an inline table of every resolved concept
//! 2. one CTE group per primary criterion, unioned and numbered in
//!    `primary_events` after the observation-window check
//! 3. primary limit, additional criteria
//! 4. `rule_hits` with one `rule_k` flag per inclusion rule, then the
//!    expression limit
//! 5. end strategy, censoring and the censor window
//! 6. padding and era collapse into `cohort_eras`
//!
//! The attrition statement reuses the chain up to `rule_hits`.

use log::{debug, info};
use octofhir_cohort_compiler::{CohortPlan, EndPlan};
use octofhir_cohort_diagnostics::Result;
use octofhir_cohort_expression::{DateField, LimitType};
use serde::{Deserialize, Serialize};

use crate::builder::{INDEX_COLUMNS, NULL_ID, SqlBuilder, indent, qualified};
use crate::dialect::Dialect;
use crate::error::EmitError;
use crate::options::EmitOptions;

/// Columns carried once episode ends are known
const EPISODE_COLUMNS: [&str; 4] = ["person_id", "event_id", "start_date", "end_date"];

/// SQL text for one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedQuery {
    pub dialect: Dialect,
    /// Yields `(subject_id, cohort_start_date, cohort_end_date)` ordered by subject and start
    pub cohort: String,
    /// Yields `(rule_index, rule_name, surviving_count, surviving_persons)` in rule order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrition: Option<String>,
}

/// Renders [`CohortPlan`]s as SQL
#[derive(Debug, Clone)]
pub struct SqlEmitter {
    options: EmitOptions,
}

impl SqlEmitter {
    pub fn new(options: EmitOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Render `plan`; identical plans and options give identical text
    pub fn emit(&self, plan: &CohortPlan) -> Result<EmittedQuery> {
        if let Some(id) = plan.undefined_codeset() {
            return Err(EmitError::UnknownCodeset { id }.into());
        }
        let dialect = self.options.dialect;
        debug!("emitting {dialect} SQL against schema {}", self.options.cdm_schema);

        let mut b = SqlBuilder::new(dialect, &self.options.cdm_schema, plan.default_event_days);
        codesets(&mut b, plan);

        let primary = primary_events(&mut b, plan);
        let mut current = limit(&mut b, "primary_limited", primary, plan.primary.limit);
        if let Some(group) = &plan.additional {
            let hits = b.group_select(group, &current);
            let sql = format!(
                "SELECT {}\nFROM {current} q\nWHERE q.event_id IN (\n{}\n)",
                qualified("q", &INDEX_COLUMNS),
                indent(&hits)
            );
            current = b.push_named("additional_events", sql);
        }

        let rule_hits = rule_hits(&mut b, plan, &current);
        if let Some(hits) = &rule_hits {
            let flags = (0..plan.inclusion_rules.len())
                .map(|k| format!("h.rule_{k} = 1"))
                .collect::<Vec<_>>()
                .join("\n  AND ");
            let sql = format!("SELECT {}\nFROM {hits} h\nWHERE {flags}", qualified("h", &INDEX_COLUMNS));
            current = b.push_named("included_events", sql);
        }
        current = limit(&mut b, "limited_events", current, plan.expression_limit);

        current = end_strategy(&mut b, plan, current);
        current = censoring(&mut b, plan, current);

        if let Some(window) = plan.censor_window {
            let mut conditions = Vec::new();
            if let Some(start) = window.start {
                conditions.push(format!("e.start_date >= {}", dialect.date_literal(start)));
            }
            if let Some(end) = window.end {
                conditions.push(format!("e.end_date <= {}", dialect.date_literal(end)));
            }
            let sql = format!(
                "SELECT {}\nFROM {current} e\nWHERE {}",
                qualified("e", &EPISODE_COLUMNS),
                conditions.join("\n  AND ")
            );
            current = b.push_named("windowed_events", sql);
        }

        let pad = plan.collapse.pad_days;
        if pad != 0 {
            let sql = format!(
                "SELECT e.person_id, e.event_id, {} AS start_date, {} AS end_date\nFROM {current} e",
                dialect.shift("e.start_date", -pad),
                dialect.shift("e.end_date", pad)
            );
            current = b.push_named("padded_events", sql);
        }

        let eras = merge_eras(&mut b, "cohort", &current, plan.collapse.gap_days);
        let cohort = b.render(&format!(
            "SELECT person_id AS subject_id, start_date AS cohort_start_date, end_date AS cohort_end_date\nFROM {eras}\nORDER BY subject_id, cohort_start_date"
        ));

        let attrition = match rule_hits {
            Some(hits) if self.options.include_attrition => Some(attrition(&b, plan, &hits)),
            _ => None,
        };

        info!(
            "emitted {dialect} cohort query: {} CTEs, {} inclusion rules",
            b.cte_count(),
            plan.inclusion_rules.len()
        );
        Ok(EmittedQuery {
            dialect,
            cohort,
            attrition,
        })
    }
}

fn codesets(b: &mut SqlBuilder<'_>, plan: &CohortPlan) {
    let rows: Vec<String> = plan
        .codesets
        .iter()
        .flat_map(|codeset| codeset.concepts.iter().map(move |concept| format!("({}, {concept})", codeset.id)))
        .collect();
    let sql = if rows.is_empty() {
        format!("SELECT {NULL_ID} AS codeset_id, {NULL_ID} AS concept_id\nWHERE 1 = 0")
    } else {
        format!(
            "SELECT v.codeset_id, v.concept_id\nFROM {}",
            b.dialect().values_table(&rows, "v", "codeset_id, concept_id")
        )
    };
    debug!("codesets table: {} rows", rows.len());
    b.push_named("codesets", sql);
}

fn primary_events(b: &mut SqlBuilder<'_>, plan: &CohortPlan) -> String {
    let mut parts = Vec::with_capacity(plan.primary.events.len());
    for (k, query) in plan.primary.events.iter().enumerate() {
        let events = b.event_query(query);
        parts.push(format!(
            "SELECT person_id, event_id AS source_event_id, start_date, end_date, visit_occurrence_id, {k} AS criterion_index\nFROM {events}"
        ));
    }
    let union = if parts.is_empty() {
        format!(
            "SELECT {NULL_ID} AS person_id, {NULL_ID} AS source_event_id, CAST(NULL AS DATE) AS start_date, CAST(NULL AS DATE) AS end_date, {NULL_ID} AS visit_occurrence_id, 0 AS criterion_index\nWHERE 1 = 0"
        )
    } else {
        parts.join("\nUNION ALL\n")
    };
    b.push_named("primary_union", union);

    let dialect = b.dialect();
    let op_start = "op.observation_period_start_date";
    let op_end = "op.observation_period_end_date";
    let sql = format!(
        "SELECT u.person_id,\n  ROW_NUMBER() OVER (ORDER BY u.person_id, u.start_date, u.end_date, u.criterion_index, u.source_event_id) AS event_id,\n  u.start_date, u.end_date, u.visit_occurrence_id,\n  {op_start} AS op_start_date, {op_end} AS op_end_date\nFROM primary_union u\nJOIN {} op ON op.person_id = u.person_id\n  AND u.start_date >= {}\n  AND u.start_date <= {}",
        b.table("observation_period"),
        dialect.shift(op_start, plan.primary.prior_days),
        dialect.shift(op_end, -plan.primary.post_days)
    );
    b.push_named("primary_events", sql)
}

/// Keep one event per person when `limit` asks for it
fn limit(b: &mut SqlBuilder<'_>, name: &str, source: String, limit: LimitType) -> String {
    let order = match limit {
        LimitType::All => return source,
        LimitType::First => "s.start_date, s.event_id",
        LimitType::Last => "s.start_date DESC, s.event_id DESC",
    };
    let columns = qualified("s", &INDEX_COLUMNS);
    let sql = format!(
        "SELECT {columns}\nFROM (\n  SELECT {columns}, ROW_NUMBER() OVER (PARTITION BY s.person_id ORDER BY {order}) AS ordinal\n  FROM {source} s\n) s\nWHERE s.ordinal = 1"
    );
    b.push_named(name, sql)
}

/// Qualified events with a 0/1 flag per inclusion rule
fn rule_hits(b: &mut SqlBuilder<'_>, plan: &CohortPlan, events: &str) -> Option<String> {
    if plan.inclusion_rules.is_empty() {
        return None;
    }
    let mut joins = String::new();
    let mut flags = Vec::with_capacity(plan.inclusion_rules.len());
    for (k, rule) in plan.inclusion_rules.iter().enumerate() {
        let hits = b.group_select(&rule.group, events);
        joins.push_str(&format!(
            "\nLEFT JOIN (\n{}\n) r{k} ON r{k}.event_id = q.event_id",
            indent(&hits)
        ));
        flags.push(format!("CASE WHEN r{k}.event_id IS NULL THEN 0 ELSE 1 END AS rule_{k}"));
    }
    let sql = format!(
        "SELECT {},\n  {}\nFROM {events} q{joins}",
        qualified("q", &INDEX_COLUMNS),
        flags.join(",\n  ")
    );
    Some(b.push_named("rule_hits", sql))
}

fn attrition(b: &SqlBuilder<'_>, plan: &CohortPlan, rule_hits: &str) -> String {
    let dialect = b.dialect();
    let rows = plan
        .inclusion_rules
        .iter()
        .enumerate()
        .map(|(k, rule)| {
            let survived = (0..=k).map(|j| format!("rule_{j} = 1")).collect::<Vec<_>>().join(" AND ");
            format!(
                "SELECT {k} AS rule_index, {} AS rule_name, COUNT(*) AS surviving_count, COUNT(DISTINCT person_id) AS surviving_persons\nFROM {rule_hits}\nWHERE {survived}",
                dialect.string_literal(&rule.name)
            )
        })
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n");
    b.render_through(rule_hits, &format!("{rows}\nORDER BY rule_index"))
}

fn end_strategy(b: &mut SqlBuilder<'_>, plan: &CohortPlan, events: String) -> String {
    let dialect = b.dialect();
    let clamp = |end: &str| format!("CASE WHEN {end} > i.op_end_date THEN i.op_end_date ELSE {end} END");
    let offset_ends = |b: &mut SqlBuilder<'_>, name: &str, source: String, field: DateField, offset: i64| {
        let base = match field {
            DateField::StartDate => "i.start_date",
            DateField::EndDate => "i.end_date",
        };
        let sql = format!(
            "SELECT i.person_id, i.event_id, i.start_date, {} AS end_date, i.visit_occurrence_id, i.op_start_date, i.op_end_date\nFROM {source} i",
            clamp(&dialect.shift(base, offset))
        );
        b.push_named(name, sql)
    };
    match plan.end_strategy {
        EndPlan::Default => events,
        EndPlan::DateOffset { field, offset } => offset_ends(b, "strategy_ends", events, field, offset),
        EndPlan::CustomEra {
            codeset_id,
            gap_days,
            offset,
            days_supply_override,
            date_offset,
        } => {
            let start = "d.drug_exposure_start_date";
            let end = match days_supply_override {
                Some(days) => dialect.shift(start, days),
                None => format!(
                    "COALESCE(d.drug_exposure_end_date, {}, {})",
                    dialect.add_days(start, "d.days_supply"),
                    dialect.shift(start, 1)
                ),
            };
            let members = b.codeset_members(codeset_id);
            let sql = format!(
                "SELECT d.person_id, {start} AS start_date, {end} AS end_date\nFROM {} d\nWHERE d.drug_concept_id IN ({members})\n  OR d.drug_source_concept_id IN ({members})",
                b.table("drug_exposure")
            );
            let exposures = b.push_named("era_exposures", sql);
            let eras = merge_eras(b, "drug", &exposures, gap_days);
            let sql = format!(
                "SELECT person_id, start_date AS era_start, {} AS era_end\nFROM {eras}",
                dialect.shift("end_date", offset)
            );
            let spans = b.push_named("drug_era_spans", sql);
            let sql = format!(
                "SELECT i.person_id, i.event_id, i.start_date, {} AS end_date, i.visit_occurrence_id, i.op_start_date, i.op_end_date\nFROM {events} i\nJOIN {spans} s ON s.person_id = i.person_id\n  AND i.start_date >= s.era_start\n  AND i.start_date <= s.era_end\nGROUP BY i.person_id, i.event_id, i.start_date, i.visit_occurrence_id, i.op_start_date, i.op_end_date",
                clamp("MIN(s.era_end)")
            );
            let ends = b.push_named("strategy_ends", sql);
            match date_offset {
                Some(d) => offset_ends(b, "offset_ends", ends, d.field, d.offset),
                None => ends,
            }
        }
    }
}

/// End each episode at the first censoring event on or after its start
fn censoring(b: &mut SqlBuilder<'_>, plan: &CohortPlan, events: String) -> String {
    if plan.censoring.is_empty() {
        return events;
    }
    let mut parts = Vec::with_capacity(plan.censoring.len());
    for query in &plan.censoring {
        let name = b.event_query(query);
        parts.push(format!("SELECT person_id, start_date FROM {name}"));
    }
    let censor_events = b.push_named("censor_events", parts.join("\nUNION ALL\n"));
    let sql = format!(
        "SELECT i.person_id, i.event_id, i.start_date,\n  CASE WHEN MIN(c.start_date) < i.end_date THEN MIN(c.start_date) ELSE i.end_date END AS end_date\nFROM {events} i\nLEFT JOIN {censor_events} c ON c.person_id = i.person_id\n  AND c.start_date >= i.start_date\nGROUP BY i.person_id, i.event_id, i.start_date, i.end_date"
    );
    b.push_named("censored_events", sql)
}

/// Merge `(person_id, start_date, end_date)` rows whose gap is at most `gap_days`
///
/// A row opens a new era unless some earlier row of the person, extended by
/// the gap, reaches its start. Era numbers are the running count of opened
/// eras.
fn merge_eras(b: &mut SqlBuilder<'_>, prefix: &str, source: &str, gap_days: i64) -> String {
    let reach = b.dialect().shift("s.end_date", gap_days);
    let sql = format!(
        "SELECT s.person_id, s.start_date, s.end_date,\n  CASE WHEN MAX({reach}) OVER (PARTITION BY s.person_id ORDER BY s.start_date, s.end_date ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING) >= s.start_date THEN 0 ELSE 1 END AS is_new\nFROM {source} s"
    );
    let marks = b.push_named(&format!("{prefix}_era_marks"), sql);
    let sql = format!(
        "SELECT m.person_id, m.start_date, m.end_date,\n  SUM(m.is_new) OVER (PARTITION BY m.person_id ORDER BY m.start_date, m.end_date ROWS UNBOUNDED PRECEDING) AS era_number\nFROM {marks} m"
    );
    let groups = b.push_named(&format!("{prefix}_era_groups"), sql);
    let sql = format!(
        "SELECT g.person_id, MIN(g.start_date) AS start_date, MAX(g.end_date) AS end_date\nFROM {groups} g\nGROUP BY g.person_id, g.era_number"
    );
    b.push_named(&format!("{prefix}_eras"), sql)
}
