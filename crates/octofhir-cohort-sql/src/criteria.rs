//! Event queries, row filters and criteria groups
//!
//! An event query becomes one or more CTEs exposing [`EVENT_COLUMNS`].
//! A criteria group becomes a `SELECT i.event_id` over an index CTE
//! (anything exposing [`INDEX_COLUMNS`]) returning the index events the group
//! accepts. Null column values never satisfy a comparison; an excluded
//! concept list is the one place where null passes.

use octofhir_cohort_compiler::domain::PERSON_ID;
use octofhir_cohort_compiler::{
    ABNORMAL_VALUE_CONCEPTS, Column, CorrelatedPlan, DateBound, DemographicPlan, DistinctColumn,
    EventDate, EventQuery, Filter, GroupKind, GroupPlan, NumericBound, Operand,
};
use octofhir_cohort_expression::{ConceptSetId, DateField, OccurrenceType, RangeOp, TextOp};

use crate::builder::{EVENT_COLUMNS, NULL_ID, SqlBuilder, indent, qualified};

/// How filters see the row they constrain
struct RowScope {
    /// Alias owning [`Column::Event`] columns
    alias: &'static str,
    start: String,
    end: String,
}

impl RowScope {
    fn date(&self, at: EventDate) -> &str {
        match at {
            EventDate::Start => &self.start,
            EventDate::End => &self.end,
        }
    }
}

/// Lookup tables a filter list needs joined
#[derive(Debug, Default, Clone, Copy)]
struct Joins {
    person: bool,
    visit: bool,
    provider: bool,
    care_site: bool,
}

impl Joins {
    fn collect(filters: &[Filter]) -> Self {
        let mut joins = Self::default();
        for filter in filters {
            match filter {
                Filter::Concept { column, .. } | Filter::Codeset { column, .. } | Filter::Text { column, .. } => {
                    joins.add(column);
                }
                Filter::Numeric { operand, .. } => match operand {
                    Operand::Column { column } => joins.add(column),
                    Operand::Age { .. } => joins.person = true,
                    Operand::Duration | Operand::Ratio { .. } => {}
                },
                Filter::Date { .. } | Filter::Abnormal => {}
            }
        }
        joins
    }

    fn add(&mut self, column: &Column) {
        match column {
            Column::Event(_) => {}
            Column::Person(_) => self.person = true,
            Column::Visit(_) => self.visit = true,
            Column::Provider(_) => self.provider = true,
            Column::CareSite(_) => self.care_site = true,
        }
    }

    fn render(&self, builder: &SqlBuilder<'_>, alias: &str) -> String {
        let mut sql = String::new();
        if self.person {
            sql.push_str(&format!(
                "\nLEFT JOIN {} p ON p.person_id = {alias}.person_id",
                builder.table("person")
            ));
        }
        if self.visit {
            sql.push_str(&format!(
                "\nLEFT JOIN {} v ON v.visit_occurrence_id = {alias}.visit_occurrence_id",
                builder.table("visit_occurrence")
            ));
        }
        if self.provider {
            sql.push_str(&format!(
                "\nLEFT JOIN {} pr ON pr.provider_id = {alias}.provider_id",
                builder.table("provider")
            ));
        }
        if self.care_site {
            sql.push_str(&format!(
                "\nLEFT JOIN {} cs ON cs.care_site_id = {alias}.care_site_id",
                builder.table("care_site")
            ));
        }
        sql
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", conditions.join("\n  AND "))
    }
}

fn date_column(alias: &str, at: EventDate) -> String {
    match at {
        EventDate::Start => format!("{alias}.start_date"),
        EventDate::End => format!("{alias}.end_date"),
    }
}

fn number(value: f64) -> String {
    format!("{value}")
}

/// `LIKE` pattern with `!` as the escape character
fn like_pattern(op: TextOp, text: &str) -> String {
    let escaped = text.replace('!', "!!").replace('%', "!%").replace('_', "!_");
    match op {
        TextOp::StartsWith => format!("{escaped}%"),
        TextOp::EndsWith => format!("%{escaped}"),
        TextOp::Contains => format!("%{escaped}%"),
    }
}

fn range(x: &str, op: RangeOp, value: String, extent: Option<String>) -> String {
    match (op, extent) {
        (RangeOp::Lt, _) => format!("{x} < {value}"),
        (RangeOp::Lte, _) => format!("{x} <= {value}"),
        (RangeOp::Eq, _) => format!("{x} = {value}"),
        (RangeOp::NotEq, _) => format!("{x} <> {value}"),
        (RangeOp::Gt, _) => format!("{x} > {value}"),
        (RangeOp::Gte, _) => format!("{x} >= {value}"),
        (RangeOp::Between, Some(extent)) => format!("{x} BETWEEN {value} AND {extent}"),
        (RangeOp::NotBetween, Some(extent)) => format!("NOT ({x} BETWEEN {value} AND {extent})"),
        (RangeOp::Between, None) => "1 = 0".to_string(),
        (RangeOp::NotBetween, None) => format!("{x} IS NOT NULL"),
    }
}

impl SqlBuilder<'_> {
    /// Concept ids of a codeset, as a subquery
    pub fn codeset_members(&self, id: ConceptSetId) -> String {
        format!("SELECT concept_id FROM codesets WHERE codeset_id = {id}")
    }

    /// Register the CTEs of an event query and return the name of the last
    pub fn event_query(&mut self, query: &EventQuery) -> String {
        let table = query.domain.table();
        let dialect = self.dialect();
        let prefix = format!("{}_events", table.table);
        let key = table.primary_key.unwrap_or(PERSON_ID);

        let start = format!("t.{}", table.start_date);
        let fallback_end = dialect.shift(&start, self.default_event_days());
        let end = match table.end_date {
            Some(column) => format!("COALESCE(t.{column}, {fallback_end})"),
            None => fallback_end,
        };
        let scope = RowScope {
            alias: "t",
            start,
            end,
        };

        let membership = match (query.codeset_id, table.concept) {
            (Some(id), Some(column)) => Some(format!("{column} IN ({})", self.codeset_members(id))),
            _ => None,
        };
        let mut conditions = Vec::new();
        let source = if query.first {
            let filter = membership
                .map(|m| format!("\n  WHERE t0.{m}"))
                .unwrap_or_default();
            conditions.push("t.ordinal = 1".to_string());
            format!(
                "(\n  SELECT t0.*, ROW_NUMBER() OVER (PARTITION BY t0.person_id ORDER BY t0.{}, t0.{key}) AS ordinal\n  FROM {} t0{filter}\n) t",
                table.start_date,
                self.table(table.table)
            )
        } else {
            conditions.extend(membership.map(|m| format!("t.{m}")));
            format!("{} t", self.table(table.table))
        };
        conditions.extend(query.filters.iter().map(|f| self.filter(f, &scope)));

        let mut start_out = scope.start.clone();
        let mut end_out = scope.end.clone();
        if let Some(period) = &query.user_period {
            for (date, out) in [(period.start, &mut start_out), (period.end, &mut end_out)] {
                if let Some(date) = date {
                    let literal = dialect.date_literal(date);
                    conditions.push(format!("{} <= {literal} AND {} >= {literal}", scope.start, scope.end));
                    *out = literal;
                }
            }
        }

        let visit = table.visit.map_or_else(|| NULL_ID.to_string(), |c| format!("t.{c}"));
        let concept = table.concept.map_or_else(|| NULL_ID.to_string(), |c| format!("t.{c}"));
        let joins = Joins::collect(&query.filters).render(self, "t");
        let sql = format!(
            "SELECT t.person_id, t.{key} AS event_id, {start_out} AS start_date, {end_out} AS end_date, {visit} AS visit_occurrence_id, {concept} AS concept_id\nFROM {source}{joins}{}",
            where_clause(&conditions)
        );
        let mut name = self.push_cte(&prefix, sql);

        if let Some(group) = &query.correlated {
            let index = self.with_observation_period(&name);
            let hits = self.group_select(group, &index);
            let sql = format!(
                "SELECT {}\nFROM {index} e\nWHERE e.event_id IN (\n{hits}\n)",
                qualified("e", &EVENT_COLUMNS)
            );
            name = self.push_cte(&prefix, sql);
        }

        if let Some(adjustment) = &query.date_adjustment {
            let field = |f: DateField| match f {
                DateField::StartDate => "a.start_date",
                DateField::EndDate => "a.end_date",
            };
            let sql = format!(
                "SELECT a.person_id, a.event_id, {} AS start_date, {} AS end_date, a.visit_occurrence_id, a.concept_id\nFROM {name} a",
                dialect.shift(field(adjustment.start_with), adjustment.start_offset),
                dialect.shift(field(adjustment.end_with), adjustment.end_offset)
            );
            name = self.push_cte(&prefix, sql);
        }
        name
    }

    /// Event CTE extended with the bounds of the observation period containing each start
    fn with_observation_period(&mut self, events: &str) -> String {
        let sql = format!(
            "SELECT {}, op.observation_period_start_date AS op_start_date, op.observation_period_end_date AS op_end_date\nFROM {events} e\nLEFT JOIN {} op ON op.person_id = e.person_id\n  AND e.start_date >= op.observation_period_start_date\n  AND e.start_date <= op.observation_period_end_date",
            qualified("e", &EVENT_COLUMNS),
            self.table("observation_period")
        );
        self.push_cte("index_events", sql)
    }

    fn filter(&self, filter: &Filter, scope: &RowScope) -> String {
        let dialect = self.dialect();
        match filter {
            Filter::Concept {
                column,
                concepts,
                exclude,
            } => {
                let column = column_sql(column, scope);
                let list = concepts.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                match (concepts.is_empty(), exclude) {
                    (true, false) => "1 = 0".to_string(),
                    (true, true) => "1 = 1".to_string(),
                    (false, false) => format!("{column} IN ({list})"),
                    (false, true) => format!("({column} IS NULL OR {column} NOT IN ({list}))"),
                }
            }
            Filter::Codeset {
                column,
                codeset_id,
                exclude,
            } => {
                let column = column_sql(column, scope);
                let members = self.codeset_members(*codeset_id);
                if *exclude {
                    format!("({column} IS NULL OR {column} NOT IN ({members}))")
                } else {
                    format!("{column} IN ({members})")
                }
            }
            Filter::Numeric { operand, bound } => {
                let x = self.operand(operand, scope);
                numeric_range(&x, bound)
            }
            Filter::Date { at, bound } => self.date_range(scope.date(*at), bound),
            Filter::Text {
                column,
                op,
                negated,
                text,
            } => {
                let pattern = dialect.string_literal(&like_pattern(*op, text));
                let not = if *negated { "NOT " } else { "" };
                format!("{} {not}LIKE {pattern} ESCAPE '!'", column_sql(column, scope))
            }
            Filter::Abnormal => {
                let a = scope.alias;
                let flags = ABNORMAL_VALUE_CONCEPTS.map(|c| c.to_string()).join(", ");
                format!(
                    "({a}.value_as_number < {a}.range_low OR {a}.value_as_number > {a}.range_high OR {a}.value_as_concept_id IN ({flags}))"
                )
            }
        }
    }

    fn operand(&self, operand: &Operand, scope: &RowScope) -> String {
        let dialect = self.dialect();
        match operand {
            Operand::Column { column } => column_sql(column, scope),
            Operand::Age { at } => format!("({} - p.year_of_birth)", dialect.year(scope.date(*at))),
            Operand::Duration => dialect.days_between(&scope.start, &scope.end),
            Operand::Ratio {
                numerator,
                denominator,
            } => {
                let a = scope.alias;
                format!(
                    "(CAST({a}.{numerator} AS {}) / NULLIF({a}.{denominator}, 0))",
                    dialect.double_type()
                )
            }
        }
    }

    fn date_range(&self, x: &str, bound: &DateBound) -> String {
        let dialect = self.dialect();
        range(
            x,
            bound.op,
            dialect.date_literal(bound.value),
            bound.extent.map(|d| dialect.date_literal(d)),
        )
    }

    /// Index events of `index` accepted by `group`
    pub fn group_select(&mut self, group: &GroupPlan, index: &str) -> String {
        let mut children = Vec::with_capacity(group.child_count());
        for correlated in &group.criteria {
            children.push(self.correlated_select(correlated, index));
        }
        for demographic in &group.demographics {
            children.push(self.demographic_select(demographic, index));
        }
        for nested in &group.groups {
            children.push(self.group_select(nested, index));
        }

        if children.is_empty() {
            return format!("SELECT i.event_id FROM {index} i");
        }

        let mut joins = String::new();
        let mut hits = Vec::with_capacity(children.len());
        for (k, child) in children.iter().enumerate() {
            joins.push_str(&format!(
                "\nLEFT JOIN (\n{}\n) h{k} ON h{k}.event_id = i.event_id",
                indent(child)
            ));
            hits.push(format!("CASE WHEN h{k}.event_id IS NULL THEN 0 ELSE 1 END"));
        }
        let total = hits.join(" + ");
        let test = match group.kind {
            GroupKind::All => format!("({total}) = {}", children.len()),
            GroupKind::Any => format!("({total}) > 0"),
            GroupKind::AtLeast(n) => format!("({total}) >= {n}"),
            GroupKind::AtMost(n) => format!("({total}) <= {n}"),
        };
        let test = if group.invert { format!("NOT ({test})") } else { test };
        format!("SELECT i.event_id FROM {index} i{joins}\nWHERE {test}")
    }

    fn correlated_select(&mut self, correlated: &CorrelatedPlan, index: &str) -> String {
        let dialect = self.dialect();
        let events = self.event_query(&correlated.events);

        let mut on = vec!["e.person_id = i.person_id".to_string()];
        for window in [correlated.start_window, correlated.end_window].iter().flatten() {
            let event_date = date_column("e", correlated.event_date(window));
            let index_date = date_column("i", window.index_date());
            if let Some(lower) = window.lower {
                on.push(format!("{event_date} >= {}", dialect.shift(&index_date, lower)));
            }
            if let Some(upper) = window.upper {
                on.push(format!("{event_date} <= {}", dialect.shift(&index_date, upper)));
            }
        }
        if !correlated.ignore_observation_period {
            on.push("e.start_date >= i.op_start_date".to_string());
            on.push("e.start_date <= i.op_end_date".to_string());
        }
        if correlated.restrict_visit {
            on.push("e.visit_occurrence_id = i.visit_occurrence_id".to_string());
        }

        let occurrence = correlated.occurrence;
        let counted = match occurrence.distinct {
            None => "e.event_id",
            Some(DistinctColumn::DomainConcept) => "DISTINCT e.concept_id",
            Some(DistinctColumn::StartDate) => "DISTINCT e.start_date",
            Some(DistinctColumn::EndDate) => "DISTINCT e.end_date",
            Some(DistinctColumn::VisitId) => "DISTINCT e.visit_occurrence_id",
        };
        let op = match occurrence.kind {
            OccurrenceType::Exactly => "=",
            OccurrenceType::AtMost => "<=",
            OccurrenceType::AtLeast => ">=",
        };
        format!(
            "SELECT i.event_id FROM {index} i\nLEFT JOIN {events} e ON {}\nGROUP BY i.event_id\nHAVING COUNT({counted}) {op} {}",
            on.join("\n  AND "),
            occurrence.count
        )
    }

    fn demographic_select(&self, demographic: &DemographicPlan, index: &str) -> String {
        let scope = RowScope {
            alias: "i",
            start: "i.start_date".to_string(),
            end: "i.end_date".to_string(),
        };
        let conditions: Vec<_> = demographic.filters.iter().map(|f| self.filter(f, &scope)).collect();
        let joins = Joins::collect(&demographic.filters).render(self, "i");
        format!("SELECT i.event_id FROM {index} i{joins}{}", where_clause(&conditions))
    }
}

fn numeric_range(x: &str, bound: &NumericBound) -> String {
    range(x, bound.op, number(bound.value), bound.extent.map(number))
}

fn column_sql(column: &Column, scope: &RowScope) -> String {
    match column {
        Column::Event(c) => format!("{}.{c}", scope.alias),
        Column::Person(c) => format!("p.{c}"),
        Column::Visit(c) => format!("v.{c}"),
        Column::Provider(c) => format!("pr.{c}"),
        Column::CareSite(c) => format!("cs.{c}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use chrono::NaiveDate;
    use octofhir_cohort_compiler::{
        Anchor, Domain, OccurrencePlan, UserPeriod, WindowPlan,
    };
    use smallvec::smallvec;

    fn builder() -> SqlBuilder<'static> {
        SqlBuilder::new(Dialect::Postgres, "cdm", 1)
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(TextOp::StartsWith, "50%_a!"), "50!%!_a!!%");
        assert_eq!(like_pattern(TextOp::Contains, "x"), "%x%");
    }

    #[test]
    fn test_condition_query() {
        let mut query = EventQuery::new(Domain::ConditionOccurrence);
        query.codeset_id = Some(3);
        query.filters.push(Filter::Concept {
            column: Column::event("condition_type_concept_id"),
            concepts: smallvec![32020],
            exclude: true,
        });
        let mut b = builder();
        let name = b.event_query(&query);
        assert_eq!(name, "condition_occurrence_events_1");
        let sql = b.render("SELECT 1");
        assert!(sql.contains("FROM cdm.condition_occurrence t"));
        assert!(sql.contains("t.condition_concept_id IN (SELECT concept_id FROM codesets WHERE codeset_id = 3)"));
        assert!(sql.contains("(t.condition_type_concept_id IS NULL OR t.condition_type_concept_id NOT IN (32020))"));
        assert!(sql.contains("COALESCE(t.condition_end_date, CAST(t.condition_start_date + (1) * INTERVAL '1 day' AS DATE)) AS end_date"));
    }

    #[test]
    fn test_first_applies_before_filters() {
        let mut query = EventQuery::new(Domain::Measurement);
        query.codeset_id = Some(0);
        query.first = true;
        query.filters.push(Filter::Abnormal);
        let mut b = builder();
        b.event_query(&query);
        let sql = b.render("SELECT 1");
        let ordinal = sql.find("ROW_NUMBER()").unwrap();
        let abnormal = sql.find("range_low").unwrap();
        assert!(ordinal < abnormal);
        assert!(sql.contains("WHERE t0.measurement_concept_id IN"));
        assert!(sql.contains("t.ordinal = 1"));
    }

    #[test]
    fn test_person_join_for_age() {
        let mut query = EventQuery::new(Domain::DrugExposure);
        query.filters.push(Filter::Numeric {
            operand: Operand::Age { at: EventDate::Start },
            bound: NumericBound {
                op: RangeOp::Between,
                value: 18.0,
                extent: Some(64.5),
            },
        });
        let mut b = SqlBuilder::new(Dialect::SqlServer, "cdm", 1);
        b.event_query(&query);
        let sql = b.render("SELECT 1");
        assert!(sql.contains("LEFT JOIN cdm.person p ON p.person_id = t.person_id"));
        assert!(sql.contains("(YEAR(t.drug_exposure_start_date) - p.year_of_birth) BETWEEN 18 AND 64.5"));
    }

    #[test]
    fn test_user_period_replaces_dates() {
        let day = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let mut query = EventQuery::new(Domain::ObservationPeriod);
        query.user_period = Some(UserPeriod {
            start: Some(day),
            end: None,
        });
        let mut b = builder();
        b.event_query(&query);
        let sql = b.render("SELECT 1");
        assert!(sql.contains("DATE '2020-06-01' AS start_date"));
        assert!(sql.contains("t.observation_period_start_date <= DATE '2020-06-01'"));
        assert!(sql.contains("CAST(NULL AS BIGINT) AS concept_id"));
    }

    #[test]
    fn test_group_counts_children() {
        let correlated = CorrelatedPlan {
            events: EventQuery::new(Domain::Death),
            start_window: Some(WindowPlan {
                lower: Some(0),
                upper: None,
                index_anchor: Anchor::Start,
                event_anchor: Anchor::End,
            }),
            end_window: None,
            restrict_visit: false,
            ignore_observation_period: true,
            occurrence: OccurrencePlan {
                kind: OccurrenceType::Exactly,
                count: 0,
                distinct: None,
            },
        };
        let mut group = GroupPlan::new(GroupKind::AtLeast(1));
        group.criteria.push(correlated);
        group.demographics.push(DemographicPlan {
            filters: vec![Filter::Concept {
                column: Column::person("gender_concept_id"),
                concepts: smallvec![8507],
                exclude: false,
            }],
        });
        group.invert = true;

        let mut b = builder();
        let sql = b.group_select(&group, "idx");
        assert!(sql.contains("LEFT JOIN death_events_1 e ON e.person_id = i.person_id"));
        // death has no end column, so the start is compared
        assert!(sql.contains("e.start_date >= i.start_date"));
        assert!(!sql.contains("op_start_date"));
        assert!(sql.contains("HAVING COUNT(e.event_id) = 0"));
        assert!(sql.contains("p.gender_concept_id IN (8507)"));
        assert!(sql.ends_with(
            "WHERE NOT ((CASE WHEN h0.event_id IS NULL THEN 0 ELSE 1 END + CASE WHEN h1.event_id IS NULL THEN 0 ELSE 1 END) >= 1)"
        ));
    }

    #[test]
    fn test_empty_group_selects_everything() {
        let mut b = builder();
        assert_eq!(b.group_select(&GroupPlan::new(GroupKind::All), "idx"), "SELECT i.event_id FROM idx i");
    }
}
