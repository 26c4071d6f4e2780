//! Cohort compiler diagnostics and error handling
//!
//! This crate provides the error handling infrastructure shared by the cohort
//! expression model, the compiler, the SQL emitter and the in-memory executor:
//! error codes, expression-path locations, and diagnostic reporting.

mod error;
mod error_code;
mod path;

pub use error::*;
pub use error_code::*;
pub use path::*;

/// Result type for cohort operations
pub type Result<T> = std::result::Result<T, CohortError>;
