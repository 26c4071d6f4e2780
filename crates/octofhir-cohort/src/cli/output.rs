//! Output formatting utilities

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use colored::Colorize;
use octofhir_cohort_diagnostics::Diagnostic;
use octofhir_cohort_eval::{AttritionRecord, CohortEra};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "table" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unsupported output format: {other}. Use 'text' or 'json'"),
        }
    }
}

/// Set up color output; `NO_COLOR` is honored by `colored` itself
pub fn setup_colors(no_color: bool) {
    if no_color {
        colored::control::set_override(false);
    }
}

/// Route `log` records to stderr; `RUST_LOG` overrides the level
pub fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Format an error for display
pub fn format_error(error: &anyhow::Error) -> String {
    format!("{} {:#}", "Error:".red().bold(), error)
}

/// Format a warning for display
pub fn format_warning(warning: &str) -> String {
    format!("{} {}", "Warning:".yellow().bold(), warning)
}

/// Format a success message for display
pub fn format_success(message: &str) -> String {
    format!("{} {}", "Success:".green().bold(), message)
}

/// Print compile warnings to stderr
pub fn print_warnings(warnings: &[Diagnostic]) {
    for warning in warnings {
        eprintln!("{}", format_warning(&warning.to_string()));
    }
}

/// Write output to a file or stdout
pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    if let Some(path) = output_file {
        let mut file =
            File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write to output file: {}", path.display()))?;
        eprintln!("{}", format_success(&format!("Output written to {}", path.display())));
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Serialize a value as pretty JSON
pub fn format_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize JSON")
}

#[derive(Tabled)]
struct EraRow {
    #[tabled(rename = "Subject")]
    subject: i64,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
}

#[derive(Tabled)]
struct AttritionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Rule")]
    name: String,
    #[tabled(rename = "Events")]
    events: usize,
    #[tabled(rename = "Persons")]
    persons: usize,
}

/// Cohort eras as a table
pub fn format_eras(eras: &[CohortEra]) -> String {
    if eras.is_empty() {
        return "(no cohort eras)".to_string();
    }
    let rows = eras.iter().map(|era| EraRow {
        subject: era.subject_id,
        start: era.cohort_start_date.to_string(),
        end: era.cohort_end_date.to_string(),
    });
    Table::new(rows).with(Style::modern()).to_string()
}

/// Attrition records as a table
pub fn format_attrition(attrition: &[AttritionRecord]) -> String {
    let rows = attrition.iter().map(|record| AttritionRow {
        index: record.rule_index,
        name: record.rule_name.clone(),
        events: record.surviving_count,
        persons: record.surviving_persons,
    });
    Table::new(rows).with(Style::modern()).to_string()
}
