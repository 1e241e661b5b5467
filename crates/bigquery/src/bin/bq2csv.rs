//! bq2csv: execute a BigQuery SQL script from stdin, write the rows to stdout.
//!
//! stdout carries only delimited records. Everything else, including the
//! execution statistics, goes to stderr.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing::{error, info};

use bq2csv_bigquery::{
    input, logging, run_export, BigQueryClient, BigQuerySettings, ExecutionRecord, ExportConfig,
};
use bq2csv_core::config::load_dotenv;

// ── CLI ─────────────────────────────────────────────────────────────

/// Execute a BigQuery SQL script read from stdin, writing all results to
/// stdout in CSV format.
///
/// A detailed log is written to stderr with the available execution
/// statistics.
#[derive(Parser, Debug)]
#[command(name = "bq2csv", version, about, override_usage = "bq2csv -p PROJECT_ID -d DATASET < script.sql")]
struct Cli {
    /// Google Cloud project ID (required)
    #[arg(short = 'p', long, env = "BQ2CSV_PROJECT", default_value = "", hide_default_value = true)]
    project: String,

    /// BigQuery dataset (required)
    #[arg(short = 'd', long, env = "BQ2CSV_DATASET", default_value = "", hide_default_value = true)]
    dataset: String,

    /// Field delimiter, a single character
    #[arg(short = 'f', long, default_value = ",")]
    delimiter: String,

    /// BigQuery data processing location
    #[arg(short = 'l', long, env = "BQ2CSV_LOCATION")]
    location: Option<String>,

    /// Disable the query cache
    #[arg(short = 'c', long)]
    disable_cache: bool,

    /// Dry run: validate the script without executing it (also `-dr`)
    #[arg(long)]
    dry_run: bool,

    /// Output verbose detail
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn export_config(&self) -> Result<ExportConfig, bq2csv_core::Bq2CsvError> {
        ExportConfig::new(
            &self.project,
            &self.dataset,
            &self.delimiter,
            self.location.as_deref(),
            self.disable_cache,
            self.dry_run,
        )
    }
}

/// Accept the two-letter `-dr` spelling, which clap would read as `-d r`.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-dr" || arg == "--dr" {
                OsString::from("--dry-run")
            } else {
                arg
            }
        })
        .collect()
}

/// Print a clap outcome (usage error, help or version text) to `err`.
/// Returns whether the outcome is a failure.
fn report_parse_outcome<E: Write>(e: &clap::Error, err: &mut E) -> bool {
    let _ = write!(err, "{}", e.render());
    e.use_stderr()
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("error: {}\n", message);
    eprintln!("{}", Cli::command().render_help());
    ExitCode::FAILURE
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    load_dotenv();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            // stdout carries records only, so help and version go to stderr too.
            let failed = report_parse_outcome(&e, &mut io::stderr());
            return if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    let config = match cli.export_config() {
        Ok(config) => config,
        Err(e) => return usage_error(&e.to_string()),
    };

    let stderr = io::stderr();
    let subscriber = logging::subscriber(cli.verbose, stderr.is_terminal(), io::stderr);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {}", e);
    }

    info!("bq2csv {}", env!("CARGO_PKG_VERSION"));
    info!(
        project = %config.project,
        dataset = %config.dataset,
        delimiter = %config.delimiter_char().escape_default(),
        location = %config.location.as_deref().unwrap_or(""),
        disable_cache = config.disable_cache,
        dry_run = config.dry_run,
        "Arguments"
    );
    info!("Begin");

    let sql = match input::read_stdin() {
        Ok(sql) => sql,
        Err(e) => {
            error!(error = %e, "Check stdin, no SQL found");
            return ExitCode::FAILURE;
        }
    };
    info!(sql_length = sql.len(), "Reading SQL complete");
    let mut record = ExecutionRecord::new(sql);

    info!("Establishing a BigQuery client connection");
    let client = match BigQueryClient::connect(BigQuerySettings::from_env()).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "SQL execution failed");
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    match run_export(client, &config, &mut record, stdout.lock()).await {
        Ok(()) => {
            info!("End");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "SQL execution failed");
            ExitCode::FAILURE
        }
    }
}
