//! SQL rendering for compiled cohort plans
//!
//! [`SqlEmitter`] turns a [`CohortPlan`] into a single `WITH ... SELECT`
//! statement over an OMOP-style warehouse schema, plus an optional attrition
//! statement. Output is a pure function of the plan and [`EmitOptions`].
//!
//! ```ignore
//! use octofhir_cohort_sql::{Dialect, EmitOptions, SqlEmitter};
//!
//! let emitter = SqlEmitter::new(EmitOptions::new().with_dialect(Dialect::DuckDb))?;
//! let query = emitter.emit(&compiled.plan)?;
//! println!("{}", query.cohort);
//! ```
//!
//! [`CohortPlan`]: octofhir_cohort_compiler::CohortPlan

pub mod builder;
mod criteria;
pub mod dialect;
pub mod error;
pub mod options;
pub mod pipeline;

pub use builder::SqlBuilder;
pub use dialect::Dialect;
pub use error::EmitError;
pub use options::{DEFAULT_CDM_SCHEMA, EmitOptions};
pub use pipeline::{EmittedQuery, SqlEmitter};
