//! Reference executor for compiled cohort plans
//!
//! Runs a [`CohortPlan`] directly against warehouse tables held in memory.
//! It follows the stage order of the emitted SQL and is used to check that
//! SQL against small fixtures, or to evaluate a cohort without a database.
//!
//! ```ignore
//! use octofhir_cohort_eval::{CohortExecutor, InMemoryWarehouse};
//!
//! let warehouse = InMemoryWarehouse::from_json(&std::fs::read_to_string("cdm.json")?)?;
//! let result = CohortExecutor::new(&warehouse).execute(&compiled.plan)?;
//! for era in &result.eras {
//!     println!("{} {} {}", era.subject_id, era.cohort_start_date, era.cohort_end_date);
//! }
//! ```
//!
//! [`CohortPlan`]: octofhir_cohort_compiler::CohortPlan

pub mod eras;
pub mod error;
pub mod events;
pub mod executor;
pub mod groups;
pub mod result;
pub mod value;
pub mod warehouse;

pub use eras::{merge_eras, shift};
pub use error::{ExecResult, ExecutionError};
pub use events::{Evaluator, Event, IndexEvent};
pub use executor::CohortExecutor;
pub use result::{AttritionRecord, CohortEra, CohortResult};
pub use value::Value;
pub use warehouse::{InMemoryWarehouse, Row};
