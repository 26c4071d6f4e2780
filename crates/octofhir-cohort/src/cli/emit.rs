//! Emit command implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use octofhir_cohort_compiler::CohortCompiler;
use octofhir_cohort_diagnostics::CohortError;
use octofhir_cohort_sql::{DEFAULT_CDM_SCHEMA, Dialect, EmitOptions, SqlEmitter};
use octofhir_cohort_vocab::{InMemoryVocabulary, VocabularyProvider};

use super::output::{self, OutputFormat};

/// Configuration for emit command
pub struct EmitConfig {
    pub file: PathBuf,
    pub dialect: String,
    pub schema: Option<String>,
    pub vocab: Option<PathBuf>,
    pub attrition: bool,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

/// Compile an expression and print its SQL
pub async fn emit(config: EmitConfig) -> Result<()> {
    let dialect: Dialect = config.dialect.parse().map_err(CohortError::from)?;
    let options = EmitOptions::new()
        .with_dialect(dialect)
        .with_schema(config.schema.as_deref().unwrap_or(DEFAULT_CDM_SCHEMA))
        .with_attrition(config.attrition);
    let emitter = SqlEmitter::new(options)?;

    let vocabulary: Arc<dyn VocabularyProvider> = match &config.vocab {
        Some(path) => {
            let document = super::read_json(path)?;
            let vocabulary = InMemoryVocabulary::from_warehouse_tables(&document)
                .map_err(CohortError::from)
                .with_context(|| format!("Failed to load vocabulary: {}", path.display()))?;
            Arc::new(vocabulary)
        }
        None => Arc::new(InMemoryVocabulary::new()),
    };

    let expression = super::read_expression(&config.file)?;
    let compiled = CohortCompiler::new(vocabulary).compile(&expression).await?;
    output::print_warnings(&compiled.warnings);

    let query = emitter.emit(&compiled.plan)?;
    info!("emitted {} bytes of {dialect} SQL", query.cohort.len());

    let content = match config.format {
        OutputFormat::Json => output::format_json(&query)?,
        OutputFormat::Text => match &query.attrition {
            Some(attrition) => format!("{};\n\n-- attrition\n{};", query.cohort, attrition),
            None => format!("{};", query.cohort),
        },
    };
    output::write_output(&content, config.output_file.as_deref())
}
