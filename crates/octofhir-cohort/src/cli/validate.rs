//! Validate command implementation

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use octofhir_cohort_diagnostics::{CohortError, Diagnostic};
use octofhir_cohort_expression::{CohortExpression, Validator};
use serde::Serialize;

use super::CliError;
use super::output::{self, OutputFormat};

/// Configuration for validate command
pub struct ValidateConfig {
    pub files: Vec<PathBuf>,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Validation result for a single file
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Structurally validate expression files
pub fn validate(config: ValidateConfig) -> Result<()> {
    if config.files.is_empty() {
        anyhow::bail!("No files specified for validation");
    }

    let reports: Vec<FileReport> = config
        .files
        .iter()
        .map(|file| validate_file(file, config.verbose))
        .collect();
    let failed = reports.iter().filter(|r| !r.valid).count();

    match config.format {
        OutputFormat::Json => output::write_output(&output::format_json(&reports)?, config.output_file.as_deref())?,
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
            println!();
            if failed == 0 {
                println!(
                    "{}",
                    output::format_success(&format!("All {} file(s) validated successfully", reports.len()))
                );
            } else {
                eprintln!(
                    "{} {}",
                    "Validation failed:".red().bold(),
                    format!("{failed} file(s) with errors").red()
                );
            }
        }
    }

    if failed > 0 {
        return Err(CliError::ValidationFailed {
            failed,
            total: reports.len(),
        }
        .into());
    }
    Ok(())
}

/// Validate a single file, collecting every defect
pub fn validate_file(file: &Path, verbose: bool) -> FileReport {
    if verbose {
        eprintln!("Validating: {}", file.display());
    }
    let errors = match fs::read_to_string(file) {
        Err(e) => vec![CohortError::from(octofhir_cohort_expression::SerializeError::Io(e))],
        Ok(json) => match CohortExpression::from_json(&json) {
            Err(e) => vec![CohortError::from(e)],
            Ok(expression) => Validator::new().collect(&expression),
        },
    };
    FileReport {
        file: file.to_path_buf(),
        valid: errors.is_empty(),
        diagnostics: errors.iter().map(CohortError::to_diagnostic).collect(),
    }
}

fn print_report(report: &FileReport) {
    let status = if report.valid {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("{} {}", status, report.file.display().to_string().cyan());

    for diagnostic in &report.diagnostics {
        let location = diagnostic
            .location
            .as_ref()
            .map(|path| format!(" at {}", path.to_string().cyan()))
            .unwrap_or_default();
        println!(
            "  {} {}{}: {}",
            "error".red().bold(),
            diagnostic.code,
            location,
            diagnostic.message
        );
    }
}
