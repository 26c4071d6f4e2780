//! Value constraints shared by criteria: ranges, text filters, concept
//! references and concept-set selections.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vocabulary concept identifier
pub type ConceptId = i64;

/// Identifier of a concept set within one expression
pub type ConceptSetId = i64;

// ============================================================================
// Concepts
// ============================================================================

/// A vocabulary concept as embedded in expressions
///
/// Only `CONCEPT_ID` carries meaning for compilation; the remaining fields are
/// descriptive and preserved for round-tripping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Concept {
    pub concept_id: ConceptId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_concept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_concept_caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason_caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_class_id: Option<String>,
}

impl Concept {
    /// Create a concept carrying only its identifier
    pub fn new(concept_id: ConceptId) -> Self {
        Self {
            concept_id,
            concept_name: None,
            standard_concept: None,
            standard_concept_caption: None,
            invalid_reason: None,
            invalid_reason_caption: None,
            concept_code: None,
            domain_id: None,
            vocabulary_id: None,
            concept_class_id: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.concept_name = Some(name.into());
        self
    }
}

/// Membership (or non-membership) in a resolved concept set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConceptSetSelection {
    pub codeset_id: ConceptSetId,
    #[serde(default)]
    pub is_exclusion: bool,
}

// ============================================================================
// Range operators
// ============================================================================

/// Comparison operator of a numeric or date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeOp {
    Lt,
    Lte,
    Eq,
    NotEq,
    Gt,
    Gte,
    Between,
    NotBetween,
}

impl RangeOp {
    /// Parse the wire form (`lt`, `lte`, `eq`, `!eq`, `gt`, `gte`, `bt`, `!bt`)
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "eq" => Some(Self::Eq),
            "!eq" => Some(Self::NotEq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "bt" => Some(Self::Between),
            "!bt" => Some(Self::NotBetween),
            _ => None,
        }
    }

    /// Whether the operator needs an upper extent
    pub const fn needs_extent(&self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::NotEq => "!eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Between => "bt",
            Self::NotBetween => "!bt",
        }
    }
}

impl fmt::Display for RangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Ranges
// ============================================================================

/// Numeric constraint `{Value, Op, Extent}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NumericRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<f64>,
}

impl NumericRange {
    pub fn new(op: &str, value: f64) -> Self {
        Self {
            value: Some(value),
            op: Some(op.to_string()),
            extent: None,
        }
    }

    pub fn between(value: f64, extent: f64) -> Self {
        Self {
            value: Some(value),
            op: Some("bt".to_string()),
            extent: Some(extent),
        }
    }
}

/// Date constraint; dates are ISO-8601 strings on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateRange {
    pub value: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
}

impl DateRange {
    pub fn new(op: &str, value: &str) -> Self {
        Self {
            value: value.to_string(),
            op: op.to_string(),
            extent: None,
        }
    }
}

/// Parse an expression date, accepting a trailing time component
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

// ============================================================================
// Text filters
// ============================================================================

/// String match operator, optionally negated with a `!` prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextOp {
    StartsWith,
    EndsWith,
    Contains,
}

/// Text constraint `{Text, Op}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
}

impl TextFilter {
    /// Split the operator into its kind and negation flag
    pub fn operator(&self) -> Option<(TextOp, bool)> {
        let raw = self.op.as_deref().unwrap_or("contains");
        let (negated, name) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let op = match name {
            "startsWith" => TextOp::StartsWith,
            "endsWith" => TextOp::EndsWith,
            "contains" => TextOp::Contains,
            _ => return None,
        };
        Some((op, negated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_op_parse() {
        assert_eq!(RangeOp::parse("!bt"), Some(RangeOp::NotBetween));
        assert_eq!(RangeOp::parse("gte"), Some(RangeOp::Gte));
        assert_eq!(RangeOp::parse("between"), None);
        assert!(RangeOp::Between.needs_extent());
        assert!(!RangeOp::Lt.needs_extent());
    }

    #[test]
    fn test_parse_date_accepts_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 1);
        assert_eq!(parse_date("2020-03-01"), expected);
        assert_eq!(parse_date("2020-03-01T00:00:00"), expected);
        assert_eq!(parse_date("03/01/2020"), None);
    }

    #[test]
    fn test_text_operator() {
        let filter = TextFilter {
            text: Some("abc".into()),
            op: Some("!startsWith".into()),
        };
        assert_eq!(filter.operator(), Some((TextOp::StartsWith, true)));

        let bad = TextFilter {
            text: Some("abc".into()),
            op: Some("matches".into()),
        };
        assert_eq!(bad.operator(), None);
    }
}
