//! CTE accumulation
//!
//! Emission builds one `WITH` list in dependency order. Each stage pushes a
//! named common table expression and later stages refer to it by name;
//! names come from a counter so identical plans yield identical text.

use crate::dialect::Dialect;

/// Columns of every event CTE
pub const EVENT_COLUMNS: [&str; 6] = [
    "person_id",
    "event_id",
    "start_date",
    "end_date",
    "visit_occurrence_id",
    "concept_id",
];

/// Columns of every CTE that serves as an index event set
pub const INDEX_COLUMNS: [&str; 7] = [
    "person_id",
    "event_id",
    "start_date",
    "end_date",
    "visit_occurrence_id",
    "op_start_date",
    "op_end_date",
];

/// Placeholder for an id column a table does not have
pub const NULL_ID: &str = "CAST(NULL AS BIGINT)";

/// `alias.column` for each column, comma separated
pub fn qualified(alias: &str, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct SqlBuilder<'a> {
    dialect: Dialect,
    schema: &'a str,
    default_event_days: i64,
    ctes: Vec<(String, String)>,
    next_id: usize,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(dialect: Dialect, schema: &'a str, default_event_days: i64) -> Self {
        Self {
            dialect,
            schema,
            default_event_days,
            ctes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn default_event_days(&self) -> i64 {
        self.default_event_days
    }

    /// Warehouse table qualified by the configured schema
    pub fn table(&self, name: &str) -> String {
        format!("{}.{name}", self.schema)
    }

    /// Add a CTE under a fresh `prefix_N` name and return that name
    pub fn push_cte(&mut self, prefix: &str, sql: String) -> String {
        self.next_id += 1;
        let name = format!("{prefix}_{}", self.next_id);
        self.ctes.push((name.clone(), sql));
        name
    }

    /// Add a CTE under a fixed pipeline-stage name
    pub fn push_named(&mut self, name: &str, sql: String) -> String {
        self.ctes.push((name.to_string(), sql));
        name.to_string()
    }

    pub fn cte_count(&self) -> usize {
        self.ctes.len()
    }

    /// The full `WITH` list followed by `select`
    pub fn render(&self, select: &str) -> String {
        render_ctes(&self.ctes, select)
    }

    /// The `WITH` list up to and including `last`, followed by `select`
    pub fn render_through(&self, last: &str, select: &str) -> String {
        let end = self
            .ctes
            .iter()
            .position(|(name, _)| name == last)
            .map_or(self.ctes.len(), |i| i + 1);
        render_ctes(&self.ctes[..end], select)
    }
}

fn render_ctes(ctes: &[(String, String)], select: &str) -> String {
    if ctes.is_empty() {
        return select.to_string();
    }
    let body = ctes
        .iter()
        .map(|(name, sql)| format!("{name} AS (\n{}\n)", indent(sql)))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("WITH {body}\n{select}")
}

/// Indent every non-empty line by two spaces
pub fn indent(sql: &str) -> String {
    sql.lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("  {line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_are_sequential() {
        let mut builder = SqlBuilder::new(Dialect::Postgres, "cdm", 1);
        assert_eq!(builder.push_cte("events", "SELECT 1".to_string()), "events_1");
        assert_eq!(builder.push_named("included", "SELECT 2".to_string()), "included");
        assert_eq!(builder.push_cte("events", "SELECT 3".to_string()), "events_2");
        assert_eq!(builder.table("person"), "cdm.person");
    }

    #[test]
    fn test_render() {
        let mut builder = SqlBuilder::new(Dialect::Postgres, "cdm", 1);
        builder.push_named("a", "SELECT 1 AS x\nFROM t".to_string());
        builder.push_named("b", "SELECT x FROM a".to_string());
        assert_eq!(
            builder.render("SELECT x FROM b"),
            "WITH a AS (\n  SELECT 1 AS x\n  FROM t\n),\nb AS (\n  SELECT x FROM a\n)\nSELECT x FROM b"
        );
        assert_eq!(builder.render_through("a", "SELECT x FROM a"), "WITH a AS (\n  SELECT 1 AS x\n  FROM t\n)\nSELECT x FROM a");
    }

    #[test]
    fn test_qualified() {
        assert_eq!(qualified("e", &["person_id", "event_id"]), "e.person_id, e.event_id");
    }
}
