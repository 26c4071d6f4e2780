//! Cohort error types

use crate::{ErrorCode, ExpressionPath};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Error - compilation cannot proceed
    Error,
    /// Warning - compilation proceeds, result may be narrower than intended
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with location and context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Location inside the expression document
    pub location: Option<ExpressionPath>,
    /// Additional context or help
    pub help: Option<String>,
    /// Related information
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    /// Create a new warning diagnostic
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    fn with_severity(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
            help: None,
            related: Vec::new(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: ExpressionPath) -> Self {
        self.location = Some(location);
        self
    }

    /// Set help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add related information
    pub fn with_related(mut self, info: RelatedInfo) -> Self {
        self.related.push(info);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.severity, self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {}", loc)?;
        }
        Ok(())
    }
}

/// Related diagnostic information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedInfo {
    /// Location of the related node
    pub location: Option<ExpressionPath>,
    /// Message explaining the relationship
    pub message: String,
}

impl RelatedInfo {
    /// Create new related info
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            location: None,
            message: message.into(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: ExpressionPath) -> Self {
        self.location = Some(location);
        self
    }
}

/// Main cohort error type
#[derive(Debug, Clone, Error)]
pub enum CohortError {
    /// Structurally invalid expression
    #[error("{code}: {message}")]
    Schema {
        code: ErrorCode,
        message: String,
        location: Option<ExpressionPath>,
    },

    /// Variant recognized by the schema but not implemented
    #[error("{code}: {message} ({feature})")]
    Unsupported {
        code: ErrorCode,
        message: String,
        feature: String,
        location: Option<ExpressionPath>,
    },

    /// Warehouse or vocabulary backend failure
    #[error("{code}: {message}")]
    Execution { code: ErrorCode, message: String },

    /// System error
    #[error("{code}: {message}")]
    System { code: ErrorCode, message: String },

    /// Multiple errors collected
    #[error("Multiple errors: {}", .0.len())]
    Multiple(Vec<CohortError>),
}

impl CohortError {
    /// Create a schema defect
    pub fn schema(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Schema {
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Create a schema defect at a location
    pub fn schema_at(code: ErrorCode, message: impl Into<String>, location: ExpressionPath) -> Self {
        Self::Schema {
            code,
            message: message.into(),
            location: Some(location),
        }
    }

    /// Create an unsupported-feature error naming the feature
    pub fn unsupported(
        code: ErrorCode,
        feature: impl Into<String>,
        location: ExpressionPath,
    ) -> Self {
        let feature = feature.into();
        Self::Unsupported {
            code,
            message: code.info().description.to_string(),
            feature,
            location: Some(location),
        }
    }

    /// Create an execution error
    pub fn execution(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Execution {
            code,
            message: message.into(),
        }
    }

    /// Create a system error
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Schema { code, .. } => *code,
            Self::Unsupported { code, .. } => *code,
            Self::Execution { code, .. } => *code,
            Self::System { code, .. } => *code,
            Self::Multiple(errors) => errors.first().map(|e| e.code()).unwrap_or(ErrorCode::new(0)),
        }
    }

    /// Get the location if available
    pub fn location(&self) -> Option<&ExpressionPath> {
        match self {
            Self::Schema { location, .. } => location.as_ref(),
            Self::Unsupported { location, .. } => location.as_ref(),
            Self::Multiple(errors) => errors.first().and_then(|e| e.location()),
            _ => None,
        }
    }

    /// True when the input expression itself is at fault
    pub fn is_validation_failure(&self) -> bool {
        match self {
            Self::Schema { .. } | Self::Unsupported { .. } => true,
            Self::Multiple(errors) => errors.iter().all(CohortError::is_validation_failure),
            _ => false,
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Schema { code, message, location } => {
                let mut diag = Diagnostic::error(*code, message.clone());
                if let Some(loc) = location {
                    diag = diag.with_location(loc.clone());
                }
                if let Some(help) = code.info().help {
                    diag = diag.with_help(help);
                }
                diag
            }
            Self::Unsupported { code, message, feature, location } => {
                let mut diag = Diagnostic::error(*code, format!("{message}: {feature}"));
                if let Some(loc) = location {
                    diag = diag.with_location(loc.clone());
                }
                diag
            }
            Self::Execution { code, message } | Self::System { code, message } => {
                Diagnostic::error(*code, message.clone())
            }
            Self::Multiple(errors) => {
                let Some(first) = errors.first() else {
                    return Diagnostic::error(ErrorCode::new(0), "Unknown error");
                };
                errors.iter().skip(1).fold(first.to_diagnostic(), |diag, other| {
                    let related = RelatedInfo::new(other.to_string());
                    match other.location() {
                        Some(loc) => diag.with_related(related.with_location(loc.clone())),
                        None => diag.with_related(related),
                    }
                })
            }
        }
    }
}
