//! In-memory warehouse
//!
//! A warehouse document is a JSON object keyed by table name; each table is an
//! array of row objects using the standard CDM column names. Columns whose
//! name ends in `_date` or `_datetime` hold `YYYY-MM-DD` strings (a time
//! suffix is ignored). Vocabulary tables may live in the same document.

use chrono::NaiveDate;
use indexmap::IndexMap;
use log::debug;
use serde_json::Value as JsonValue;

use crate::error::{ExecResult, ExecutionError};
use crate::value::Value;

static NULL: Value = Value::Null;

/// One table row; absent columns read as null
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    fn from_json(table: &str, index: usize, json: &JsonValue) -> ExecResult<Self> {
        let JsonValue::Object(cells) = json else {
            return Err(ExecutionError::InvalidDocument(format!(
                "{table}[{index}] is not an object"
            )));
        };
        let mut values = IndexMap::with_capacity(cells.len());
        for (column, cell) in cells {
            let value = Value::from_json(cell, is_date_column(column)).map_err(|message| {
                ExecutionError::InvalidValue {
                    table: table.to_string(),
                    row: index,
                    column: column.clone(),
                    message,
                }
            })?;
            values.insert(column.clone(), value);
        }
        Ok(Self { values })
    }
}

fn is_date_column(column: &str) -> bool {
    column.ends_with("_date") || column.ends_with("_datetime")
}

/// Warehouse tables held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryWarehouse {
    tables: IndexMap<String, Vec<Row>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn from_json(json: &str) -> ExecResult<Self> {
        let document: JsonValue = serde_json::from_str(json)?;
        Self::from_value(&document)
    }

    pub fn from_value(document: &JsonValue) -> ExecResult<Self> {
        let JsonValue::Object(tables) = document else {
            return Err(ExecutionError::InvalidDocument(
                "expected an object keyed by table name".to_string(),
            ));
        };
        let mut warehouse = Self::new();
        for (name, table) in tables {
            let JsonValue::Array(rows) = table else {
                return Err(ExecutionError::InvalidDocument(format!("table '{name}' is not an array")));
            };
            let rows = rows
                .iter()
                .enumerate()
                .map(|(i, row)| Row::from_json(name, i, row))
                .collect::<ExecResult<Vec<_>>>()?;
            debug!("loaded table {name}: {} rows", rows.len());
            warehouse.tables.insert(name.clone(), rows);
        }
        Ok(warehouse)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Rows of `name`; a missing table has none
    pub fn rows(&self, name: &str) -> &[Row] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Rows of a table the warehouse must have
    pub fn require(&self, name: &str) -> ExecResult<&[Row]> {
        self.tables
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ExecutionError::MissingTable {
                table: name.to_string(),
            })
    }
}

/// Non-null integer column
pub fn required_id(row: &Row, table: &str, index: usize, column: &str) -> ExecResult<i64> {
    row.get(column).as_i64().ok_or_else(|| ExecutionError::InvalidValue {
        table: table.to_string(),
        row: index,
        column: column.to_string(),
        message: "expected an integer".to_string(),
    })
}

/// Non-null date column
pub fn required_date(row: &Row, table: &str, index: usize, column: &str) -> ExecResult<NaiveDate> {
    row.get(column).as_date().ok_or_else(|| ExecutionError::InvalidValue {
        table: table.to_string(),
        row: index,
        column: column.to_string(),
        message: "expected a date".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cohort_diagnostics::{COH0300, COH0301, COH0303};

    #[test]
    fn test_from_json() {
        let warehouse = InMemoryWarehouse::from_json(
            r#"{"person": [{"person_id": 1, "year_of_birth": 1970, "birth_datetime": "1970-03-01T00:00:00"}],
                "concept": [{"concept_id": 5}]}"#,
        )
        .unwrap();
        let person = &warehouse.rows("person")[0];
        assert_eq!(person.get("person_id"), &Value::Integer(1));
        assert_eq!(person.get("birth_datetime").as_date(), NaiveDate::from_ymd_opt(1970, 3, 1));
        assert!(person.get("gender_concept_id").is_null());
        assert!(warehouse.rows("drug_exposure").is_empty());
        assert_eq!(warehouse.table_names().collect::<Vec<_>>(), vec!["concept", "person"]);
    }

    #[test]
    fn test_errors() {
        let err = InMemoryWarehouse::from_json(r#"{"death": [{"death_date": "soon"}]}"#).unwrap_err();
        assert_eq!(err.code(), COH0301);
        assert!(err.to_string().contains("death[0].death_date"));

        let err = InMemoryWarehouse::from_json(r#"{"death": {}}"#).unwrap_err();
        assert_eq!(err.code(), COH0303);

        let err = InMemoryWarehouse::new().require("person").unwrap_err();
        assert_eq!(err.code(), COH0300);
    }
}
