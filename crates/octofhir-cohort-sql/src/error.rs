//! Emitter errors

use octofhir_cohort_diagnostics::{COH0003, COH0203, COH0401, CohortError, ErrorCode};
use octofhir_cohort_expression::ConceptSetId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("invalid CDM schema name '{0}'")]
    InvalidSchema(String),

    #[error("unknown SQL dialect '{0}'")]
    UnknownDialect(String),

    #[error("plan references codeset {id} but does not define it")]
    UnknownCodeset { id: ConceptSetId },
}

impl EmitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidSchema(_) => COH0401,
            Self::UnknownDialect(_) => COH0203,
            Self::UnknownCodeset { .. } => COH0003,
        }
    }
}

impl From<EmitError> for CohortError {
    fn from(err: EmitError) -> Self {
        let code = err.code();
        match err {
            EmitError::InvalidSchema(_) => CohortError::system(code, err.to_string()),
            EmitError::UnknownDialect(ref dialect) => CohortError::Unsupported {
                code,
                message: code.info().description.to_string(),
                feature: format!("dialect '{dialect}'"),
                location: None,
            },
            EmitError::UnknownCodeset { .. } => CohortError::schema(code, err.to_string()),
        }
    }
}
