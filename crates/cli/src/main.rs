use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use testbench_api::PlatformClient;
use testbench_engine::{LevelFilter, LogFilter, StepFilter};
use testbench_tui::RunRequest;
use testbench_types::PageRequest;
use testbench_util::PlatformConfig;
use tracing::debug;

mod bindings;
mod logging;
mod run;
mod runs;

use logging::LogTarget;

/// Run workflows, follow their logs, and edit step data bindings.
#[derive(Debug, Parser)]
#[command(name = "testbench", version, about, long_about = None)]
struct Cli {
    /// REST API base URL (overrides TESTBENCH_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Run stream base URL (overrides TESTBENCH_WS_URL and the config file)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a workflow and follow it in the run console
    Run {
        workflow_id: String,
        /// Name shown in the console header
        #[arg(long)]
        name: Option<String>,
        /// Workflow variable as KEY=VALUE; VALUE is parsed as JSON when possible
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Print log lines to stdout instead of opening the console
        #[arg(long)]
        plain: bool,
        /// Only print entries of this level (plain mode)
        #[arg(long, default_value = "all")]
        level: LevelFilter,
        /// Only print entries of this step id (plain mode)
        #[arg(long)]
        step: Option<String>,
    },
    /// Inspect past runs
    #[command(subcommand)]
    Runs(RunsCommand),
    /// Edit data bindings in a mapping file
    #[command(subcommand)]
    Bindings(bindings::BindingsCommand),
}

#[derive(Debug, Subcommand)]
enum RunsCommand {
    /// Past runs of a workflow, newest first
    History {
        workflow_id: String,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = PageRequest::DEFAULT_PAGE_SIZE)]
        page_size: u64,
    },
    /// The stored record of one run
    Show { run_id: String },
    /// Step results of one run
    Steps { run_id: String },
    /// Logs of one run
    Logs {
        run_id: String,
        #[arg(long)]
        step: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let console = matches!(&cli.command, Command::Run { plain: false, .. });
    let config = PlatformConfig::load()
        .and_then(|config| config.with_overrides(cli.api_url.clone(), cli.ws_url.clone()))
        .context("failed to load configuration")?;

    let log_file = config.log_file_path();
    logging::init_tracing(if console { LogTarget::File(&log_file) } else { LogTarget::Stderr })?;
    debug!(?config, "configuration resolved");

    match cli.command {
        Command::Run {
            workflow_id,
            name,
            vars,
            plain,
            level,
            step,
        } => {
            let request = RunRequest {
                workflow_id,
                workflow_name: name,
                variables: run::parse_variables(&vars)?,
                auto_start: true,
            };
            if plain {
                let filter = LogFilter {
                    level,
                    step: step.map(StepFilter::Only).unwrap_or_default(),
                };
                run::run_plain(&config, request, filter).await
            } else {
                run::run_console(&config, request).await
            }
        }
        Command::Runs(command) => {
            let client = PlatformClient::new(&config).context("failed to build the API client")?;
            let mut out = std::io::stdout().lock();
            match command {
                RunsCommand::History {
                    workflow_id,
                    page,
                    page_size,
                } => runs::history(&client, &workflow_id, PageRequest { page, page_size }, &mut out).await?,
                RunsCommand::Show { run_id } => runs::show(&client, &run_id, &mut out).await?,
                RunsCommand::Steps { run_id } => runs::steps(&client, &run_id, &mut out).await?,
                RunsCommand::Logs { run_id, step } => runs::logs(&client, &run_id, step.as_deref(), &mut out).await?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Bindings(command) => {
            bindings::run(command)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
