//! Warehouse cell values

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single warehouse cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    /// Convert a JSON cell; strings in date columns must be `YYYY-MM-DD`
    pub fn from_json(json: &JsonValue, is_date: bool) -> Result<Self, String> {
        match json {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Integer(i)),
                None => n.as_f64().map(Self::Number).ok_or_else(|| format!("unrepresentable number {n}")),
            },
            JsonValue::String(s) if is_date => {
                // timestamps keep only their date
                let day = s.get(..10).unwrap_or(s);
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map(Self::Date)
                    .map_err(|e| format!("'{s}' is not a date: {e}"))
            }
            JsonValue::String(s) => Ok(Self::Text(s.clone())),
            JsonValue::Bool(b) => Ok(Self::Integer(i64::from(*b))),
            other => Err(format!("unsupported cell {other}")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}
