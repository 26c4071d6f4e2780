//! In-memory vocabulary
//!
//! Backed by the three standard vocabulary tables, each a list of rows:
//!
//! - `concept`: `concept_id`, `invalid_reason`
//! - `concept_ancestor`: `ancestor_concept_id`, `descendant_concept_id`
//! - `concept_relationship`: `concept_id_1`, `concept_id_2`, `relationship_id`, `invalid_reason`

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use octofhir_cohort_expression::ConceptId;
use serde::Deserialize;
use serde_json::Value;

use crate::provider::{VocabularyError, VocabularyProvider};

const MAPS_TO: &str = "Maps to";

/// Vocabulary held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryVocabulary {
    /// concept id -> valid
    concepts: BTreeMap<ConceptId, bool>,
    /// ancestor -> descendants
    hierarchy: BTreeMap<ConceptId, BTreeSet<ConceptId>>,
    /// "Maps to" target -> sources
    mappings: BTreeMap<ConceptId, BTreeSet<ConceptId>>,
}

#[derive(Deserialize)]
struct ConceptRow {
    concept_id: ConceptId,
    #[serde(default)]
    invalid_reason: Option<String>,
}

#[derive(Deserialize)]
struct AncestorRow {
    ancestor_concept_id: ConceptId,
    descendant_concept_id: ConceptId,
}

#[derive(Deserialize)]
struct RelationshipRow {
    concept_id_1: ConceptId,
    concept_id_2: ConceptId,
    relationship_id: String,
    #[serde(default)]
    invalid_reason: Option<String>,
}

impl InMemoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a valid concept
    pub fn with_concept(mut self, id: ConceptId) -> Self {
        self.concepts.insert(id, true);
        self
    }

    /// Add a concept carrying an invalid reason
    pub fn with_invalid_concept(mut self, id: ConceptId) -> Self {
        self.concepts.insert(id, false);
        self
    }

    /// Record `descendant` below `ancestor` in the hierarchy
    pub fn with_ancestor(mut self, ancestor: ConceptId, descendant: ConceptId) -> Self {
        self.hierarchy.entry(ancestor).or_default().insert(descendant);
        self
    }

    /// Record a valid `source` "Maps to" `target` relationship
    pub fn with_maps_to(mut self, source: ConceptId, target: ConceptId) -> Self {
        self.mappings.entry(target).or_default().insert(source);
        self
    }

    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// Build from the vocabulary tables of a warehouse document
    ///
    /// The document is an object keyed by table name; tables other than the
    /// three vocabulary tables are ignored, and missing tables are empty.
    pub fn from_warehouse_tables(document: &Value) -> Result<Self, VocabularyError> {
        let Some(tables) = document.as_object() else {
            return Err(VocabularyError::InvalidTable {
                table: "<root>".to_string(),
                message: "expected an object keyed by table name".to_string(),
            });
        };
        let mut vocab = Self::new();

        for row in rows::<ConceptRow>(tables.get("concept"), "concept")? {
            vocab.concepts.insert(row.concept_id, row.invalid_reason.is_none());
        }
        for row in rows::<AncestorRow>(tables.get("concept_ancestor"), "concept_ancestor")? {
            vocab = vocab.with_ancestor(row.ancestor_concept_id, row.descendant_concept_id);
        }
        for row in rows::<RelationshipRow>(tables.get("concept_relationship"), "concept_relationship")? {
            if row.relationship_id == MAPS_TO && row.invalid_reason.is_none() {
                vocab = vocab.with_maps_to(row.concept_id_1, row.concept_id_2);
            }
        }

        log::debug!(
            "loaded vocabulary: {} concepts, {} ancestors, {} mapping targets",
            vocab.concepts.len(),
            vocab.hierarchy.len(),
            vocab.mappings.len()
        );
        Ok(vocab)
    }

    /// Parse a warehouse JSON document and build from its vocabulary tables
    pub fn from_json(json: &str) -> Result<Self, VocabularyError> {
        let document: Value = serde_json::from_str(json)?;
        Self::from_warehouse_tables(&document)
    }

    fn is_valid(&self, id: ConceptId) -> bool {
        self.concepts.get(&id).copied().unwrap_or(false)
    }
}

fn rows<T: for<'de> Deserialize<'de>>(table: Option<&Value>, name: &str) -> Result<Vec<T>, VocabularyError> {
    match table {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| VocabularyError::InvalidTable {
            table: name.to_string(),
            message: e.to_string(),
        }),
    }
}

#[async_trait]
impl VocabularyProvider for InMemoryVocabulary {
    async fn known_concepts(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        Ok(ids.iter().copied().filter(|id| self.concepts.contains_key(id)).collect())
    }

    async fn descendants(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.hierarchy.get(id))
            .flatten()
            .copied()
            .filter(|id| self.is_valid(*id))
            .collect())
    }

    async fn mapped_from(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.mappings.get(id))
            .flatten()
            .copied()
            .collect())
    }

    fn supports_concurrent_lookups(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(ids: &[ConceptId]) -> BTreeSet<ConceptId> {
        ids.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_descendants_skip_invalid_concepts() {
        let vocab = InMemoryVocabulary::new()
            .with_concept(1)
            .with_concept(2)
            .with_invalid_concept(3)
            .with_ancestor(1, 1)
            .with_ancestor(1, 2)
            .with_ancestor(1, 3);
        assert_eq!(vocab.descendants(&[1]).await.unwrap(), set(&[1, 2]));
        assert_eq!(vocab.known_concepts(&[1, 3, 99]).await.unwrap(), set(&[1, 3]));
    }

    #[tokio::test]
    async fn test_from_warehouse_tables() {
        let json = r#"{
            "person": [{"person_id": 1}],
            "concept": [
                {"concept_id": 10, "invalid_reason": null},
                {"concept_id": 11},
                {"concept_id": 12, "invalid_reason": "D"}
            ],
            "concept_ancestor": [
                {"ancestor_concept_id": 10, "descendant_concept_id": 11},
                {"ancestor_concept_id": 10, "descendant_concept_id": 12}
            ],
            "concept_relationship": [
                {"concept_id_1": 500, "concept_id_2": 10, "relationship_id": "Maps to"},
                {"concept_id_1": 501, "concept_id_2": 10, "relationship_id": "Maps to", "invalid_reason": "U"},
                {"concept_id_1": 502, "concept_id_2": 10, "relationship_id": "Is a"}
            ]
        }"#;
        let vocab = InMemoryVocabulary::from_json(json).unwrap();
        assert_eq!(vocab.concept_count(), 3);
        assert_eq!(vocab.descendants(&[10]).await.unwrap(), set(&[11]));
        assert_eq!(vocab.mapped_from(&[10]).await.unwrap(), set(&[500]));
    }

    #[test]
    fn test_bad_table_is_reported() {
        let err = InMemoryVocabulary::from_json(r#"{"concept": [{"name": "x"}]}"#).unwrap_err();
        assert!(matches!(err, VocabularyError::InvalidTable { ref table, .. } if table == "concept"));
    }
}
