//! Cohort expression model
//!
//! Typed representation of cohort definitions in the established JSON
//! cohort-expression format, together with serialization and structural
//! validation.
//!
//! ```
//! use octofhir_cohort_expression::{CohortExpression, validate};
//!
//! let json = r#"{
//!     "ConceptSets": [{"id": 0, "name": "t2dm", "expression": {"items": [
//!         {"concept": {"CONCEPT_ID": 201826}, "includeDescendants": true}
//!     ]}}],
//!     "PrimaryCriteria": {"CriteriaList": [{"ConditionOccurrence": {"CodesetId": 0}}]}
//! }"#;
//! let expression = CohortExpression::from_json(json).unwrap();
//! assert!(validate(&expression).is_ok());
//! ```

pub mod criteria;
pub mod filters;
pub mod model;
pub mod serialize;
pub mod validate;

pub use criteria::*;
pub use filters::*;
pub use model::*;
pub use serialize::*;
pub use validate::{DEFAULT_MAX_GROUP_DEPTH, Validator, validate};
