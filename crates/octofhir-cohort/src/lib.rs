//! Cohort definition compiler
//!
//! This crate ties the cohort workspace together:
//! - Parsing and validating cohort expression JSON
//! - Resolving concept sets against a vocabulary
//! - Compiling to a dialect-neutral plan
//! - Emitting SQL for a warehouse dialect
//! - Executing plans against an in-memory warehouse
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_cohort::{Dialect, EmitOptions, InMemoryVocabulary, SqlEmitter, compile_json};
//!
//! let vocabulary = Arc::new(InMemoryVocabulary::from_json(&vocabulary_json)?);
//! let compiled = compile_json(&expression_json, vocabulary).await?;
//! let emitter = SqlEmitter::new(EmitOptions::new().with_dialect(Dialect::Postgres))?;
//! println!("{}", emitter.emit(&compiled.plan)?.cohort);
//! ```

use std::sync::Arc;

// Re-export all public APIs from internal crates
pub use octofhir_cohort_compiler as compiler;
pub use octofhir_cohort_diagnostics as diagnostics;
pub use octofhir_cohort_eval as eval;
pub use octofhir_cohort_expression as expression;
pub use octofhir_cohort_sql as sql;
pub use octofhir_cohort_vocab as vocab;

// Convenience re-exports
pub use octofhir_cohort_compiler::{CohortCompiler, CohortPlan, CompileOptions, CompiledCohort};
pub use octofhir_cohort_diagnostics::{CohortError, Diagnostic, ErrorCode, Result};
pub use octofhir_cohort_eval::{CohortEra, CohortExecutor, CohortResult, InMemoryWarehouse};
pub use octofhir_cohort_expression::{CohortExpression, validate};
pub use octofhir_cohort_sql::{Dialect, EmitOptions, EmittedQuery, SqlEmitter};
pub use octofhir_cohort_vocab::{CachingVocabulary, InMemoryVocabulary, VocabularyProvider};

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;

/// Parse, validate and compile an expression document
pub async fn compile_json(json: &str, vocabulary: Arc<dyn VocabularyProvider>) -> Result<CompiledCohort> {
    compile_json_with(json, vocabulary, CompileOptions::default()).await
}

pub async fn compile_json_with(
    json: &str,
    vocabulary: Arc<dyn VocabularyProvider>,
    options: CompileOptions,
) -> Result<CompiledCohort> {
    let expression = CohortExpression::from_json(json)?;
    CohortCompiler::with_options(vocabulary, options)
        .compile(&expression)
        .await
}
