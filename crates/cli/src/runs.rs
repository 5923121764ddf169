//! `testbench runs`: read-only views of past runs.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::Value;
use testbench_api::PlatformClient;
use testbench_types::{PageRequest, Paginated, WorkflowRunRecord};

pub async fn history(client: &PlatformClient, workflow_id: &str, page: PageRequest, out: &mut impl Write) -> Result<()> {
    let runs = client
        .run_history(workflow_id, page)
        .await
        .with_context(|| format!("failed to load run history for {workflow_id}"))?;
    write_history(&runs, out)
}

pub async fn show(client: &PlatformClient, run_id: &str, out: &mut impl Write) -> Result<()> {
    let record = client.get_run(run_id).await.with_context(|| format!("failed to load run {run_id}"))?;
    writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
    Ok(())
}

pub async fn steps(client: &PlatformClient, run_id: &str, out: &mut impl Write) -> Result<()> {
    let steps = client
        .run_steps(run_id)
        .await
        .with_context(|| format!("failed to load steps of run {run_id}"))?;
    write_json_lines(&steps, out)
}

pub async fn logs(client: &PlatformClient, run_id: &str, step_id: Option<&str>, out: &mut impl Write) -> Result<()> {
    let logs = client
        .run_logs(run_id, step_id)
        .await
        .with_context(|| format!("failed to load logs of run {run_id}"))?;
    write_json_lines(&logs, out)
}

fn write_history(runs: &Paginated<WorkflowRunRecord>, out: &mut impl Write) -> Result<()> {
    if runs.data.is_empty() {
        writeln!(out, "No runs yet.")?;
        return Ok(());
    }
    writeln!(out, "{:<38} {:<10} {:<26} {:>10}", "RUN", "STATUS", "STARTED", "DURATION")?;
    for run in &runs.data {
        let duration = run.duration.map(|ms| format!("{ms} ms")).unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<38} {:<10} {:<26} {:>10}",
            run.run_id,
            run.status,
            run.start_time.as_deref().unwrap_or("-"),
            duration
        )?;
    }
    writeln!(out, "page {} of {} ({} runs)", runs.page(), runs.total_pages(), runs.total)?;
    Ok(())
}

fn write_json_lines(values: &[Value], out: &mut impl Write) -> Result<()> {
    for value in values {
        writeln!(out, "{}", serde_json::to_string(value)?)?;
    }
    Ok(())
}
