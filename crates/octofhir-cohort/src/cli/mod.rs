//! CLI functionality for the cohort tool
//!
//! This module contains all CLI-related functionality including:
//! - SQL emission
//! - In-memory execution
//! - Validation
//! - Output formatting and exit codes

pub mod emit;
pub mod execute;
pub mod output;
pub mod validate;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use octofhir_cohort_diagnostics::CohortError;
use octofhir_cohort_expression::CohortExpression;

/// Process exit status of the `cohort` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    /// Malformed or unsupported expression
    Invalid = 2,
    /// Warehouse or vocabulary failure
    Execution = 3,
}

impl ExitCode {
    /// Exit status for an error surfaced by a command
    pub fn of(error: &anyhow::Error) -> Self {
        if error.downcast_ref::<CliError>().is_some() {
            return Self::Invalid;
        }
        match error.downcast_ref::<CohortError>() {
            Some(err) if err.is_validation_failure() => Self::Invalid,
            Some(CohortError::Execution { .. }) => Self::Execution,
            _ => Self::Failure,
        }
    }
}

/// Failures reported by the commands themselves
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{failed} of {total} file(s) failed validation")]
    ValidationFailed { failed: usize, total: usize },
}

/// Load and parse an expression document
pub fn read_expression(path: &Path) -> Result<CohortExpression> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read expression file: {}", path.display()))?;
    CohortExpression::from_json(&json)
        .map_err(CohortError::from)
        .with_context(|| format!("Failed to parse expression file: {}", path.display()))
}

/// Load a JSON document such as a warehouse or vocabulary file
pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON file: {}", path.display()))
}
