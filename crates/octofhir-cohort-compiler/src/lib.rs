//! Cohort expression compiler
//!
//! This crate turns a validated [`CohortExpression`] into a dialect-neutral
//! [`CohortPlan`]:
//! - Concept sets are flattened through a [`VocabularyProvider`]
//! - Each criterion is translated by a single per-domain rule
//! - Criteria groups become boolean plan trees evaluated by [`GroupKind`]
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_cohort_compiler::CohortCompiler;
//! use octofhir_cohort_vocab::InMemoryVocabulary;
//!
//! let compiler = CohortCompiler::new(Arc::new(InMemoryVocabulary::from_json(&tables)?));
//! let compiled = compiler.compile(&expression).await?;
//! println!("{}", compiled.plan.to_json_pretty()?);
//! ```
//!
//! [`CohortExpression`]: octofhir_cohort_expression::CohortExpression
//! [`VocabularyProvider`]: octofhir_cohort_vocab::VocabularyProvider

pub mod codesets;
pub mod compiler;
pub mod domain;
pub mod logic;
pub mod options;
pub mod plan;
pub mod translate;

pub use codesets::{CodesetResolver, Resolution};
pub use compiler::{CohortCompiler, CompiledCohort, translate};
pub use domain::{Domain, DomainTable};
pub use options::{CompileOptions, DEFAULT_EVENT_DAYS};
pub use plan::*;
pub use translate::CriteriaTranslator;
