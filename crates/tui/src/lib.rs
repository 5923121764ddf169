//! # Testbench TUI Library
//!
//! Terminal run console for a single workflow: starts the run, follows its
//! live stream, and renders the step table and the filtered log panel with
//! Ratatui.
//!
//! ## Architecture
//!
//! [`app::App`] wraps the run controller and the view state (filters,
//! scrolling, follow mode). The runtime in `ui::runtime` owns the terminal
//! and multiplexes input, controller messages and ticks in one loop; the view
//! in `ui::view` renders a frame from the app state.

mod app;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map as JsonMap, Value};
use testbench_api::{PlatformClient, RunStreamClient};
use testbench_engine::RunOutcome;
use testbench_util::PlatformConfig;

/// What the console should run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub workflow_id: String,
    /// Shown in the header; defaults to the workflow id.
    pub workflow_name: Option<String>,
    pub variables: JsonMap<String, Value>,
    /// Start immediately instead of waiting for `s`.
    pub auto_start: bool,
}

impl RunRequest {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.workflow_name.as_deref().unwrap_or(&self.workflow_id)
    }
}

/// Runs the console until the user quits.
///
/// Returns the outcome of the last attempt that reached a terminal status,
/// if any.
///
/// # Errors
///
/// Fails when the API client cannot be built from `config`, or on terminal
/// setup and drawing errors.
pub async fn run(config: &PlatformConfig, request: RunRequest) -> Result<Option<RunOutcome>> {
    let backend = PlatformClient::new(config).context("failed to build the API client")?;
    let connector = RunStreamClient::from_config(config);
    ui::runtime::run_app(Arc::new(backend), Arc::new(connector), request).await
}
