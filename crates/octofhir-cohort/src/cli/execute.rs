//! Execute command implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use octofhir_cohort_compiler::CohortCompiler;
use octofhir_cohort_diagnostics::CohortError;
use octofhir_cohort_eval::{CohortExecutor, InMemoryWarehouse};
use octofhir_cohort_vocab::InMemoryVocabulary;

use super::output::{self, OutputFormat};

/// Configuration for execute command
pub struct ExecuteConfig {
    pub file: PathBuf,
    pub data: PathBuf,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

/// Run an expression against a warehouse file
///
/// The vocabulary tables are read from the warehouse document itself.
pub async fn execute(config: ExecuteConfig) -> Result<()> {
    let document = super::read_json(&config.data)?;
    let vocabulary = InMemoryVocabulary::from_warehouse_tables(&document)
        .map_err(CohortError::from)
        .with_context(|| format!("Failed to load vocabulary tables: {}", config.data.display()))?;
    let warehouse = InMemoryWarehouse::from_value(&document)
        .map_err(CohortError::from)
        .with_context(|| format!("Failed to load warehouse: {}", config.data.display()))?;

    let expression = super::read_expression(&config.file)?;
    let compiled = CohortCompiler::new(Arc::new(vocabulary)).compile(&expression).await?;
    output::print_warnings(&compiled.warnings);

    let result = CohortExecutor::new(&warehouse).execute(&compiled.plan)?;
    info!("{} eras for {} subjects", result.eras.len(), result.subjects().len());

    let content = match config.format {
        OutputFormat::Json => output::format_json(&result)?,
        OutputFormat::Text if result.attrition.is_empty() => output::format_eras(&result.eras),
        OutputFormat::Text => format!(
            "{}\n\n{}",
            output::format_eras(&result.eras),
            output::format_attrition(&result.attrition)
        ),
    };
    output::write_output(&content, config.output_file.as_deref())
}
