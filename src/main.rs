use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use cron_wrapper::config::{JobOptions, WrapperConfig};
use cron_wrapper::runner::ShellRunner;
use cron_wrapper::wrapper::{self, JobWrapper};

#[derive(Debug, Parser)]
#[command(
    name = "cron-wrapper",
    about = "Run a CRON job and capture information in JSON files",
    version,
    long_about = None
)]
struct Cli {
    /// The unique name for the job
    name: String,

    /// The command to run
    #[arg(required_unless_present = "status")]
    command: Option<String>,

    /// Timeout in seconds
    #[arg(long, short = 't')]
    timeout: Option<u64>,

    /// Force execution if another instance is running
    #[arg(long, short = 'f')]
    force: bool,

    /// Show verbose log
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Run in debug mode with additional output
    #[arg(long)]
    debug: bool,

    /// Output folder for status files
    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// Output status file
    #[arg(long, short = 'o')]
    output_file: Option<PathBuf>,

    /// Report stdout and stderr in the status file
    #[arg(long)]
    report_stdout: bool,

    /// Report the previous execution in the status file
    #[arg(long)]
    report_previous: bool,

    /// Do not write any status file
    #[arg(long)]
    skip_write: bool,

    /// Do not read the latest status from the output file
    #[arg(long)]
    skip_read: bool,

    /// Do not write to the aggregated output file
    #[arg(long)]
    skip_aggregation: bool,

    /// TOML config file (default: $CRON_WRAPPER_CONFIG, then /etc/cron-wrapper/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the job's aggregated status as JSON instead of running it
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WrapperConfig::load(path)?,
        None => cron_wrapper::logging::with_bootstrap(WrapperConfig::load_or_default),
    };
    if let Some(folder) = &cli.output_folder {
        config.output.folder = folder.clone();
    }

    let verbose = cli.verbose || cli.debug;
    cron_wrapper::logging::init(&config.logging, verbose)?;
    if cli.debug {
        tracing::info!("running in debug mode");
    }
    if verbose {
        tracing::info!("running in verbose mode");
        tracing::debug!(args = ?cli, "running cron wrapper");
    }

    if cli.status {
        let code = match wrapper::inspect(&config, &cli.name).await {
            Ok(Some(record)) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                0
            }
            Ok(None) => {
                eprintln!("No aggregated status for job '{}'.", cli.name);
                1
            }
            Err(e) => {
                tracing::error!(job = %cli.name, error = %e, "failed to read aggregated status");
                e.exit_code()
            }
        };
        std::process::exit(code);
    }

    let timeout = cli
        .timeout
        .unwrap_or(config.execution.default_timeout_secs);
    let options = JobOptions {
        name: cli.name.clone(),
        command: cli.command.clone().unwrap_or_default(),
        timeout: Duration::from_secs(timeout),
        force: cli.force,
        verbose,
        debug: cli.debug,
        output_file: cli.output_file.clone(),
        report_stdout: cli.report_stdout,
        report_previous: cli.report_previous,
        skip_write: cli.skip_write,
        skip_read: cli.skip_read,
        skip_aggregation: cli.skip_aggregation,
    };

    let runner = ShellRunner::new(config.execution.shell.clone());
    let job = JobWrapper::new(&config, options, runner);
    let code = match job.run().await {
        Ok(summary) => summary.exit_code,
        Err(e) => {
            tracing::error!(job = %cli.name, error = %e, "failed to record job status");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
