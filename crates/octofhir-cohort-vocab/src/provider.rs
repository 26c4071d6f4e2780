//! Vocabulary provider trait

use std::collections::BTreeSet;

use async_trait::async_trait;
use octofhir_cohort_diagnostics::{COH0302, COH0303, COH0400, CohortError};
use octofhir_cohort_expression::ConceptId;

/// Read-only access to the standard vocabulary
///
/// All lookups take a batch of ids and return the union of their results.
#[async_trait]
pub trait VocabularyProvider: Send + Sync {
    /// Subset of `ids` present in the concept table
    async fn known_concepts(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError>;

    /// Valid descendants of `ids` per the ancestor hierarchy
    async fn descendants(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError>;

    /// Concepts with a valid "Maps to" relationship onto any of `ids`
    async fn mapped_from(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError>;

    /// Whether independent lookups may run concurrently
    fn supports_concurrent_lookups(&self) -> bool {
        false
    }
}

/// Vocabulary lookup error
#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("Invalid vocabulary table '{table}': {message}")]
    InvalidTable { table: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VocabularyError> for CohortError {
    fn from(err: VocabularyError) -> Self {
        match err {
            VocabularyError::LookupFailed(message) => CohortError::execution(COH0302, message),
            VocabularyError::InvalidTable { .. } | VocabularyError::Json(_) => {
                CohortError::execution(COH0303, err.to_string())
            }
            VocabularyError::Io(e) => CohortError::system(COH0400, e.to_string()),
        }
    }
}
