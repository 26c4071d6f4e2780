//! Emitter configuration

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::EmitError;

pub const DEFAULT_CDM_SCHEMA: &str = "cdm";

/// `schema` or `catalog.schema`, unquoted
static SCHEMA_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").ok());

/// Configuration for [`SqlEmitter`](crate::SqlEmitter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitOptions {
    /// Schema holding the warehouse tables; spliced into the SQL unquoted
    pub cdm_schema: String,
    pub dialect: Dialect,
    /// Also emit the per-rule attrition statement
    pub include_attrition: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            cdm_schema: DEFAULT_CDM_SCHEMA.to_string(),
            dialect: Dialect::default(),
            include_attrition: true,
        }
    }
}

impl EmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.cdm_schema = schema.into();
        self
    }

    pub fn with_attrition(mut self, include: bool) -> Self {
        self.include_attrition = include;
        self
    }

    /// Reject schema names that are not plain identifiers
    pub fn validate(&self) -> Result<(), EmitError> {
        match SCHEMA_NAME.as_ref() {
            Some(pattern) if pattern.is_match(&self.cdm_schema) => Ok(()),
            _ => Err(EmitError::InvalidSchema(self.cdm_schema.clone())),
        }
    }
}
