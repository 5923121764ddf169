//! `testbench run`: the terminal console, or plain streaming to stdout.

use std::{io::Write, process::ExitCode, sync::Arc};

use anyhow::{Context, Result, bail};
use serde_json::{Map as JsonMap, Value};
use testbench_api::{PlatformClient, RunStreamClient};
use testbench_engine::{LogFilter, RunController, RunOutcome, format_message};
use testbench_tui::RunRequest;
use testbench_types::{LogEntry, RunStatus};
use testbench_util::{PlatformConfig, format_log_time};
use tokio::signal;
use tracing::warn;

/// Parses `KEY=VALUE` pairs. Values that parse as JSON keep their type;
/// anything else is a string.
pub fn parse_variables(pairs: &[String]) -> Result<JsonMap<String, Value>> {
    let mut variables = JsonMap::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid variable '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid variable '{pair}': empty key");
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        variables.insert(key.to_string(), value);
    }
    Ok(variables)
}

/// One log entry as printed in plain mode.
pub fn format_entry(entry: &LogEntry) -> String {
    format!(
        "{} {:<5} [{}] {}",
        format_log_time(&entry.timestamp),
        entry.level.label(),
        entry.step_label(),
        format_message(&entry.message)
    )
}

fn succeeded(outcome: Option<&RunOutcome>) -> bool {
    outcome.is_some_and(|outcome| outcome.status == RunStatus::Success)
}

/// Runs the terminal console. Quitting before a verdict is not a failure.
pub async fn run_console(config: &PlatformConfig, request: RunRequest) -> Result<ExitCode> {
    let outcome = testbench_tui::run(config, request).await?;
    Ok(match outcome {
        Some(outcome) if outcome.status == RunStatus::Failed => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// Starts the run and prints each new log entry that passes `filter` until
/// the run reaches a verdict or Ctrl+C stops it.
pub async fn run_plain(config: &PlatformConfig, request: RunRequest, filter: LogFilter) -> Result<ExitCode> {
    let backend = PlatformClient::new(config).context("failed to build the API client")?;
    let connector = RunStreamClient::from_config(config);
    let (mut controller, mut inbox) = RunController::new(Arc::new(backend), Arc::new(connector));
    controller.start(&request.workflow_id, request.variables)?;

    let stdout = std::io::stdout();
    let mut printed = 0;
    let outcome = loop {
        tokio::select! {
            Some(message) = inbox.recv() => {
                let outcome = controller.apply(message);
                printed = print_new_entries(&mut stdout.lock(), &controller, &filter, printed)?;
                if outcome.is_some() {
                    break outcome;
                }
            }
            _ = signal::ctrl_c() => {
                if !controller.stop() {
                    warn!("interrupted before the run started");
                }
                print_new_entries(&mut stdout.lock(), &controller, &filter, printed)?;
                controller.shutdown();
                break None;
            }
        }
    };

    Ok(if succeeded(outcome.as_ref()) { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Writes entries appended since `printed` and returns the new high-water mark.
fn print_new_entries(out: &mut impl Write, controller: &RunController, filter: &LogFilter, printed: usize) -> Result<usize> {
    let entries = controller.logs().entries();
    for entry in entries.iter().skip(printed).filter(|entry| filter.matches(entry)) {
        writeln!(out, "{}", format_entry(entry))?;
    }
    Ok(entries.len())
}
