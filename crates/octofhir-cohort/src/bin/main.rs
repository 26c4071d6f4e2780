//! Cohort command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use octofhir_cohort::cli::output::{self, OutputFormat};
use octofhir_cohort::cli::{ExitCode, emit, execute, validate};

/// Cohort definition command-line tool
#[derive(Parser)]
#[command(name = "cohort")]
#[command(author, version, about = "Cohort definition compiler", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an expression to SQL
    Emit {
        /// Cohort expression file (JSON)
        file: PathBuf,

        /// Target dialect (postgres, duckdb, sqlserver, spark)
        #[arg(short, long, default_value = "postgres")]
        dialect: String,

        /// Schema holding the warehouse tables
        #[arg(short, long)]
        schema: Option<String>,

        /// Vocabulary tables (JSON)
        #[arg(long)]
        vocab: Option<PathBuf>,

        /// Also emit the attrition statement
        #[arg(short, long)]
        attrition: bool,
    },

    /// Execute an expression against an in-memory warehouse
    Execute {
        /// Cohort expression file (JSON)
        file: PathBuf,

        /// Warehouse tables, vocabulary included (JSON)
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Validate expression files
    Validate {
        /// Cohort expression files to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    output::setup_colors(cli.no_color);
    output::setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Emit {
            file,
            dialect,
            schema,
            vocab,
            attrition,
        } => {
            let config = emit::EmitConfig {
                file,
                dialect,
                schema,
                vocab,
                attrition,
                format: cli.format,
                output_file: cli.output,
            };
            emit::emit(config).await
        }

        Commands::Execute { file, data } => {
            let config = execute::ExecuteConfig {
                file,
                data,
                format: cli.format,
                output_file: cli.output,
            };
            execute::execute(config).await
        }

        Commands::Validate { files } => {
            let config = validate::ValidateConfig {
                files,
                format: cli.format,
                output_file: cli.output,
                verbose: cli.verbose,
            };
            validate::validate(config)
        }
    };

    if let Err(e) = result {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(ExitCode::of(&e) as i32);
    }
}
