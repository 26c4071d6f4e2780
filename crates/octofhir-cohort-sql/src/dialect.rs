//! Target SQL dialects
//!
//! Every construct whose spelling differs between warehouses goes through a
//! [`Dialect`] method; the rest of the emitter writes portable SQL only
//! (`CASE` instead of `LEAST`/`GREATEST`, window functions with explicit
//! `ROWS` frames, no boolean-typed columns).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EmitError;

/// A warehouse SQL flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
    SqlServer,
    Spark,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Self::Postgres, Self::DuckDb, Self::SqlServer, Self::Spark];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::DuckDb => "duckdb",
            Self::SqlServer => "sqlserver",
            Self::Spark => "spark",
        }
    }

    /// `date` moved by `amount` days, where `amount` is any integer expression
    pub fn add_days(&self, date: &str, amount: &str) -> String {
        match self {
            Self::Postgres => format!("CAST({date} + ({amount}) * INTERVAL '1 day' AS DATE)"),
            Self::DuckDb => format!("CAST({date} + INTERVAL ({amount}) DAY AS DATE)"),
            Self::SqlServer => format!("DATEADD(day, {amount}, {date})"),
            Self::Spark => format!("date_add({date}, {amount})"),
        }
    }

    /// `date` moved by a constant number of days; zero leaves it untouched
    pub fn shift(&self, date: &str, days: i64) -> String {
        if days == 0 {
            date.to_string()
        } else {
            self.add_days(date, &days.to_string())
        }
    }

    /// Whole days from `from` to `to`
    pub fn days_between(&self, from: &str, to: &str) -> String {
        match self {
            Self::Postgres => format!("(CAST({to} AS DATE) - CAST({from} AS DATE))"),
            Self::DuckDb => format!("date_diff('day', {from}, {to})"),
            Self::SqlServer => format!("DATEDIFF(day, {from}, {to})"),
            Self::Spark => format!("datediff({to}, {from})"),
        }
    }

    pub fn date_literal(&self, date: NaiveDate) -> String {
        let text = date.format("%Y-%m-%d");
        match self {
            Self::SqlServer => format!("CAST('{text}' AS DATE)"),
            _ => format!("DATE '{text}'"),
        }
    }

    pub fn year(&self, date: &str) -> String {
        match self {
            Self::SqlServer => format!("YEAR({date})"),
            _ => format!("EXTRACT(YEAR FROM {date})"),
        }
    }

    pub fn double_type(&self) -> &'static str {
        match self {
            Self::Postgres => "DOUBLE PRECISION",
            Self::SqlServer => "FLOAT",
            Self::DuckDb | Self::Spark => "DOUBLE",
        }
    }

    pub fn string_literal(&self, text: &str) -> String {
        let escaped = text.replace('\'', "''");
        match self {
            Self::Spark => format!("'{}'", escaped.replace('\\', "\\\\")),
            _ => format!("'{escaped}'"),
        }
    }

    /// Inline table of `rows` (each already parenthesised) named `alias(columns)`
    pub fn values_table(&self, rows: &[String], alias: &str, columns: &str) -> String {
        let rows = rows.join(",\n  ");
        match self {
            Self::Spark => format!("VALUES\n  {rows}\nAS {alias}({columns})"),
            _ => format!("(VALUES\n  {rows}\n) AS {alias}({columns})"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = EmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "duckdb" => Ok(Self::DuckDb),
            "sqlserver" | "mssql" | "tsql" => Ok(Self::SqlServer),
            "spark" | "databricks" => Ok(Self::Spark),
            _ => Err(EmitError::UnknownDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Dialect::Postgres, "CAST(x + (3) * INTERVAL '1 day' AS DATE)")]
    #[case(Dialect::DuckDb, "CAST(x + INTERVAL (3) DAY AS DATE)")]
    #[case(Dialect::SqlServer, "DATEADD(day, 3, x)")]
    #[case(Dialect::Spark, "date_add(x, 3)")]
    fn test_add_days(#[case] dialect: Dialect, #[case] expected: &str) {
        assert_eq!(dialect.shift("x", 3), expected);
        assert_eq!(dialect.shift("x", 0), "x");
    }

    #[rstest]
    #[case("postgresql", Dialect::Postgres)]
    #[case("DuckDB", Dialect::DuckDb)]
    #[case("mssql", Dialect::SqlServer)]
    #[case("spark", Dialect::Spark)]
    fn test_parse(#[case] input: &str, #[case] expected: Dialect) {
        assert_eq!(input.parse::<Dialect>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "oracle".parse::<Dialect>(),
            Err(EmitError::UnknownDialect("oracle".to_string()))
        );
    }

    #[test]
    fn test_literals() {
        let date = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
        assert_eq!(Dialect::Postgres.date_literal(date), "DATE '2020-02-29'");
        assert_eq!(Dialect::SqlServer.date_literal(date), "CAST('2020-02-29' AS DATE)");
        assert_eq!(Dialect::Postgres.string_literal("O'Brien"), "'O''Brien'");
        assert_eq!(Dialect::Spark.string_literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_serde_names_match_display() {
        for dialect in Dialect::ALL {
            let json = serde_json::to_string(&dialect).unwrap();
            assert_eq!(json, format!("\"{dialect}\""));
        }
    }
}
