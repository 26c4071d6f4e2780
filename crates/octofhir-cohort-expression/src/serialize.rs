//! Cohort expression serialization
//!
//! JSON reading happens in two passes: the raw document is first scanned for
//! criteria objects whose variant key is not part of the closed variant set,
//! so that such defects are reported with their location, then the document
//! is deserialized into the typed model.

use std::io::{Read, Write};

use octofhir_cohort_diagnostics::{COH0001, COH0002, COH0400, COH0402, CohortError, ExpressionPath};
use serde_json::Value;

use crate::criteria::CRITERIA_VARIANTS;
use crate::model::CohortExpression;

/// Errors that can occur during serialization
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// JSON syntax or shape error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A criteria object names a variant outside the closed set
    #[error("unknown criteria variant '{variant}' at {path}")]
    UnknownVariant { variant: String, path: ExpressionPath },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SerializeError> for CohortError {
    fn from(err: SerializeError) -> Self {
        match err {
            SerializeError::Json(e) if e.is_io() => CohortError::system(COH0400, e.to_string()),
            SerializeError::Json(e) if e.is_syntax() || e.is_data() || e.is_eof() => {
                CohortError::schema(COH0001, e.to_string())
            }
            SerializeError::Json(e) => CohortError::system(COH0402, e.to_string()),
            SerializeError::UnknownVariant { variant, path } => {
                CohortError::schema_at(COH0002, format!("unknown criteria variant '{variant}'"), path)
            }
            SerializeError::Io(e) => CohortError::system(COH0400, e.to_string()),
        }
    }
}

/// Trait for cohort expression serializers
pub trait ExpressionSerializer {
    /// Serialize an expression to a string
    fn serialize(&self, expression: &CohortExpression) -> Result<String, SerializeError>;

    /// Serialize an expression to a writer
    fn serialize_to_writer<W: Write>(
        &self,
        expression: &CohortExpression,
        writer: W,
    ) -> Result<(), SerializeError>;

    /// Deserialize an expression from a string
    fn deserialize(&self, input: &str) -> Result<CohortExpression, SerializeError>;

    /// Deserialize an expression from a reader
    fn deserialize_from_reader<R: Read>(&self, reader: R) -> Result<CohortExpression, SerializeError>;
}

/// JSON serializer for cohort expressions
#[derive(Debug, Default, Clone)]
pub struct JsonSerializer {
    /// Whether to produce pretty-printed output
    pub pretty: bool,
}

impl JsonSerializer {
    /// Create a new JSON serializer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new JSON serializer with pretty-printing enabled
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl ExpressionSerializer for JsonSerializer {
    fn serialize(&self, expression: &CohortExpression) -> Result<String, SerializeError> {
        let result = if self.pretty {
            serde_json::to_string_pretty(expression)?
        } else {
            serde_json::to_string(expression)?
        };
        Ok(result)
    }

    fn serialize_to_writer<W: Write>(
        &self,
        expression: &CohortExpression,
        mut writer: W,
    ) -> Result<(), SerializeError> {
        let json = self.serialize(expression)?;
        writer.write_all(json.as_bytes())?;
        Ok(())
    }

    fn deserialize(&self, input: &str) -> Result<CohortExpression, SerializeError> {
        let document: Value = serde_json::from_str(input)?;
        scan_document(&document)?;
        Ok(serde_json::from_value(document)?)
    }

    fn deserialize_from_reader<R: Read>(&self, mut reader: R) -> Result<CohortExpression, SerializeError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        self.deserialize(&content)
    }
}

impl CohortExpression {
    /// Parse an expression from JSON text
    pub fn from_json(input: &str) -> Result<Self, SerializeError> {
        JsonSerializer::new().deserialize(input)
    }

    /// Compact JSON text
    pub fn to_json(&self) -> Result<String, SerializeError> {
        JsonSerializer::new().serialize(self)
    }

    /// Pretty-printed JSON text
    pub fn to_json_pretty(&self) -> Result<String, SerializeError> {
        JsonSerializer::pretty().serialize(self)
    }
}

// ============================================================================
// Variant scan
// ============================================================================

fn scan_document(document: &Value) -> Result<(), SerializeError> {
    let root = ExpressionPath::root();
    let primary = root.field("PrimaryCriteria").field("CriteriaList");
    for (i, criteria) in array(document.pointer("/PrimaryCriteria/CriteriaList")) {
        scan_criteria(criteria, &primary.index(i))?;
    }
    let censoring = root.field("CensoringCriteria");
    for (i, criteria) in array(document.get("CensoringCriteria")) {
        scan_criteria(criteria, &censoring.index(i))?;
    }
    if let Some(group) = document.get("AdditionalCriteria") {
        scan_group(group, &root.field("AdditionalCriteria"))?;
    }
    let rules = root.field("InclusionRules");
    for (i, rule) in array(document.get("InclusionRules")) {
        if let Some(group) = rule.get("expression") {
            scan_group(group, &rules.index(i).field("expression"))?;
        }
    }
    Ok(())
}

fn scan_group(group: &Value, path: &ExpressionPath) -> Result<(), SerializeError> {
    let list = path.field("CriteriaList");
    for (i, correlated) in array(group.get("CriteriaList")) {
        if let Some(criteria) = correlated.get("Criteria") {
            scan_criteria(criteria, &list.index(i).field("Criteria"))?;
        }
    }
    let groups = path.field("Groups");
    for (i, nested) in array(group.get("Groups")) {
        scan_group(nested, &groups.index(i))?;
    }
    Ok(())
}

fn scan_criteria(criteria: &Value, path: &ExpressionPath) -> Result<(), SerializeError> {
    let Some(object) = criteria.as_object() else {
        return Ok(());
    };
    for (variant, body) in object {
        if !CRITERIA_VARIANTS.contains(&variant.as_str()) {
            return Err(SerializeError::UnknownVariant {
                variant: variant.clone(),
                path: path.clone(),
            });
        }
        if let Some(group) = body.get("CorrelatedCriteria") {
            scan_group(group, &path.field(variant.clone()).field("CorrelatedCriteria"))?;
        }
    }
    Ok(())
}

fn array(value: Option<&Value>) -> impl Iterator<Item = (usize, &Value)> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_variant_reports_path() {
        let json = r#"{
            "ConceptSets": [],
            "PrimaryCriteria": {"CriteriaList": [{"ConditionOccurrence": {}}]},
            "InclusionRules": [{"name": "r", "expression": {"Type": "ALL", "CriteriaList": [
                {"Criteria": {"Immunization": {}}}
            ]}}]
        }"#;
        let err = CohortExpression::from_json(json).unwrap_err();
        let SerializeError::UnknownVariant { variant, path } = &err else {
            panic!("expected unknown variant, got {err}");
        };
        assert_eq!(variant, "Immunization");
        assert_eq!(path.to_string(), "InclusionRules[0].expression.CriteriaList[0].Criteria");

        let cohort_err: CohortError = err.into();
        assert_eq!(cohort_err.code(), COH0002);
    }

    #[test]
    fn test_malformed_json_is_schema_defect() {
        let err: CohortError = CohortExpression::from_json("{").unwrap_err().into();
        assert_eq!(err.code(), COH0001);
        assert!(err.is_validation_failure());
    }
}
