// smallarea CLI - census extract ingestion and indicator computation

mod commands;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{ingest_exit_code, EXIT_INVALID_CONFIG, EXIT_IO, EXIT_SUCCESS};
use smallarea_engine::SpecValidationError;
use smallarea_recon::IngestError;

#[derive(Parser)]
#[command(name = "smallarea")]
#[command(about = "Assemble census table fragments, reconcile totals and compute small-area indicators")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble and reconcile the source tables of a pipeline
    #[command(after_help = "\
Examples:
  smallarea ingest manchester.pipeline.toml
  smallarea ingest manchester.pipeline.toml --output units.csv
  smallarea ingest manchester.pipeline.toml --json --strict")]
    Ingest {
        /// Path to the pipeline TOML document
        pipeline: PathBuf,

        /// Write the merged unit table (CSV); overrides [output] units
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the ingestion summary as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit with code 5 when any table fails sum reconciliation
        #[arg(long)]
        strict: bool,
    },

    /// Check an indicator specification without computing anything
    #[command(after_help = "\
Examples:
  smallarea validate indicators.toml
  smallarea validate indicators.toml --json")]
    Validate {
        /// Path to the indicator specification TOML
        spec: PathBuf,

        /// Print the indicators in evaluation order as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Ingest, compute every indicator and write the table and status report
    #[command(after_help = "\
Examples:
  smallarea run manchester.pipeline.toml
  smallarea run manchester.pipeline.toml --json
  RUST_LOG=debug smallarea run manchester.pipeline.toml --strict")]
    Run {
        /// Path to the pipeline TOML document
        pipeline: PathBuf,

        /// Print the computation report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit with code 5 when any table fails sum reconciliation
        #[arg(long)]
        strict: bool,
    },

    /// Measure how many reference keys have a unit in the ingested table
    #[command(after_help = "\
Examples:
  smallarea coverage manchester.pipeline.toml --keys boundary_zones.txt
  smallarea coverage manchester.pipeline.toml --keys boundary_zones.txt --json")]
    Coverage {
        /// Path to the pipeline TOML document
        pipeline: PathBuf,

        /// Reference key list, one key per line
        #[arg(long)]
        keys: PathBuf,

        /// Print the coverage report as JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  smallarea-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Ingest { pipeline, output, json, strict } => {
            commands::cmd_ingest(pipeline, output, json, strict)
        }
        Commands::Validate { spec, json } => commands::cmd_validate(spec, json),
        Commands::Run { pipeline, json, strict } => commands::cmd_run(pipeline, json, strict),
        Commands::Coverage { pipeline, keys, json } => commands::cmd_coverage(pipeline, keys, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INVALID_CONFIG, msg)
    }

    /// Create error from an ingestion error with the matching exit code.
    pub fn ingest(err: IngestError) -> Self {
        let hint = match &err {
            IngestError::FragmentMismatch { .. } => {
                Some("fragments of one table must list the same units; check for a truncated export".to_string())
            }
            IngestError::ColumnCollision { .. } => {
                Some("each value column may come from one fragment of one table only".to_string())
            }
            IngestError::Load { .. } => Some("fragment paths are resolved against the pipeline file's directory".to_string()),
            _ => None,
        };
        Self { code: ingest_exit_code(&err), message: err.to_string(), hint }
    }

    /// Create error from a specification error, naming the file.
    pub fn spec(path: &std::path::Path, err: SpecValidationError) -> Self {
        let hint = match &err {
            SpecValidationError::PhaseViolation { .. } => Some(
                "phases run raw, denominator, rate, composite; an indicator may only read earlier phases".to_string(),
            ),
            SpecValidationError::UnknownKind { .. } => {
                Some("kind must be one of: raw, denominator, rate, composite".to_string())
            }
            _ => None,
        };
        Self {
            code: EXIT_INVALID_CONFIG,
            message: format!("{}: {err}", path.display()),
            hint,
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
