//! Execution errors

use octofhir_cohort_diagnostics::{COH0003, COH0300, COH0301, COH0302, COH0303, CohortError, ErrorCode};
use octofhir_cohort_expression::ConceptSetId;
use thiserror::Error;

/// Result type for warehouse operations
pub type ExecResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("warehouse has no '{table}' table")]
    MissingTable { table: String },

    #[error("invalid value in {table}[{row}].{column}: {message}")]
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        message: String,
    },

    #[error("vocabulary lookup failed: {0}")]
    Vocabulary(String),

    #[error("invalid warehouse document: {0}")]
    InvalidDocument(String),

    #[error("plan references codeset {id} but does not define it")]
    UnknownCodeset { id: ConceptSetId },
}

impl ExecutionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingTable { .. } => COH0300,
            Self::InvalidValue { .. } => COH0301,
            Self::Vocabulary(_) => COH0302,
            Self::InvalidDocument(_) => COH0303,
            Self::UnknownCodeset { .. } => COH0003,
        }
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

impl From<ExecutionError> for CohortError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::UnknownCodeset { .. } => CohortError::schema(err.code(), err.to_string()),
            _ => CohortError::execution(err.code(), err.to_string()),
        }
    }
}
