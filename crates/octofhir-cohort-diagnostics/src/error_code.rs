//! Cohort error codes following a structured numbering system
//!
//! Error code ranges:
//! - COH0001-COH0099: Schema defects (fatal, reported before compilation)
//! - COH0100-COH0199: Vocabulary-resolution gaps (non-fatal warnings)
//! - COH0200-COH0299: Unsupported features (fatal)
//! - COH0300-COH0399: Execution errors (warehouse, vocabulary backend)
//! - COH0400-COH0499: System errors (I/O, configuration, serialization)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// Check if this is a schema defect (0001-0099)
    pub const fn is_schema_defect(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    /// Check if this is a vocabulary gap (0100-0199)
    pub const fn is_vocabulary_gap(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is an unsupported feature (0200-0299)
    pub const fn is_unsupported(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Check if this is an execution error (0300-0399)
    pub const fn is_execution_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Check if this is a system error (0400-0499)
    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COH{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Schema defects (0001-0099)
    map.insert(1, ErrorInfo::new("Malformed cohort expression document"));
    map.insert(2, ErrorInfo::new("Unknown criteria variant"));
    map.insert(3, ErrorInfo::new("Undefined concept set reference")
        .with_help("Every CodesetId must name the id of an entry in ConceptSets"));
    map.insert(4, ErrorInfo::new("Duplicate concept set id"));
    map.insert(5, ErrorInfo::new("Conflicting concept set items")
        .with_help("The same concept appears twice in one set with different flags"));
    map.insert(6, ErrorInfo::new("Malformed temporal window")
        .with_help("The window start must not lie after the window end"));
    map.insert(7, ErrorInfo::new("Negative occurrence count"));
    map.insert(8, ErrorInfo::new("Invalid range operator"));
    map.insert(9, ErrorInfo::new("Missing range extent")
        .with_help("The 'bt' and '!bt' operators require an Extent"));
    map.insert(10, ErrorInfo::new("Invalid date"));
    map.insert(11, ErrorInfo::new("Negative observation window"));
    map.insert(12, ErrorInfo::new("Criteria group nesting too deep"));
    map.insert(13, ErrorInfo::new("Negative group count"));
    map.insert(14, ErrorInfo::new("Missing primary criteria"));
    map.insert(15, ErrorInfo::new("Invalid text filter operator"));
    map.insert(16, ErrorInfo::new("Negative era padding"));
    map.insert(17, ErrorInfo::new("Censor window start after end"));
    map.insert(18, ErrorInfo::new("Missing end strategy codeset"));

    // Vocabulary gaps (0100-0199)
    map.insert(100, ErrorInfo::new("Unknown concept id")
        .with_help("The concept is absent from the vocabulary and contributes nothing"));
    map.insert(101, ErrorInfo::new("Concept set resolved to no concepts"));

    // Unsupported features (0200-0299)
    map.insert(200, ErrorInfo::new("Unsupported criteria variant"));
    map.insert(201, ErrorInfo::new("Unsupported occurrence count column"));
    map.insert(202, ErrorInfo::new("Unsupported end strategy"));
    map.insert(203, ErrorInfo::new("Unsupported dialect feature"));

    // Execution errors (0300-0399)
    map.insert(300, ErrorInfo::new("Missing warehouse table"));
    map.insert(301, ErrorInfo::new("Invalid warehouse value"));
    map.insert(302, ErrorInfo::new("Vocabulary lookup failed"));
    map.insert(303, ErrorInfo::new("Invalid warehouse document"));

    // System errors (0400-0499)
    map.insert(400, ErrorInfo::new("I/O error"));
    map.insert(401, ErrorInfo::new("Invalid configuration"));
    map.insert(402, ErrorInfo::new("Serialization failure"));

    map
});

// Schema defects
pub const COH0001: ErrorCode = ErrorCode::new(1);
pub const COH0002: ErrorCode = ErrorCode::new(2);
pub const COH0003: ErrorCode = ErrorCode::new(3);
pub const COH0004: ErrorCode = ErrorCode::new(4);
pub const COH0005: ErrorCode = ErrorCode::new(5);
pub const COH0006: ErrorCode = ErrorCode::new(6);
pub const COH0007: ErrorCode = ErrorCode::new(7);
pub const COH0008: ErrorCode = ErrorCode::new(8);
pub const COH0009: ErrorCode = ErrorCode::new(9);
pub const COH0010: ErrorCode = ErrorCode::new(10);
pub const COH0011: ErrorCode = ErrorCode::new(11);
pub const COH0012: ErrorCode = ErrorCode::new(12);
pub const COH0013: ErrorCode = ErrorCode::new(13);
pub const COH0014: ErrorCode = ErrorCode::new(14);
pub const COH0015: ErrorCode = ErrorCode::new(15);
pub const COH0016: ErrorCode = ErrorCode::new(16);
pub const COH0017: ErrorCode = ErrorCode::new(17);
pub const COH0018: ErrorCode = ErrorCode::new(18);

// Vocabulary gaps
pub const COH0100: ErrorCode = ErrorCode::new(100);
pub const COH0101: ErrorCode = ErrorCode::new(101);

// Unsupported features
pub const COH0200: ErrorCode = ErrorCode::new(200);
pub const COH0201: ErrorCode = ErrorCode::new(201);
pub const COH0202: ErrorCode = ErrorCode::new(202);
pub const COH0203: ErrorCode = ErrorCode::new(203);

// Execution errors
pub const COH0300: ErrorCode = ErrorCode::new(300);
pub const COH0301: ErrorCode = ErrorCode::new(301);
pub const COH0302: ErrorCode = ErrorCode::new(302);
pub const COH0303: ErrorCode = ErrorCode::new(303);

// System errors
pub const COH0400: ErrorCode = ErrorCode::new(400);
pub const COH0401: ErrorCode = ErrorCode::new(401);
pub const COH0402: ErrorCode = ErrorCode::new(402);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(COH0001.to_string(), "COH0001");
        assert_eq!(COH0100.to_string(), "COH0100");
    }

    #[test]
    fn test_error_categories() {
        assert!(COH0003.is_schema_defect());
        assert!(!COH0003.is_vocabulary_gap());

        assert!(COH0100.is_vocabulary_gap());
        assert!(COH0200.is_unsupported());
        assert!(COH0300.is_execution_error());
        assert!(COH0400.is_system_error());
    }

    #[test]
    fn test_error_info() {
        assert_eq!(COH0006.info().description, "Malformed temporal window");
        assert!(COH0009.info().help.is_some());
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
