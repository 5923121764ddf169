//! State of one execution attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};
use testbench_types::RunStatus;
use testbench_util::format_elapsed;

/// One execution attempt, from the start request to its terminal status.
///
/// `status` only moves forward (`Idle -> Running -> terminal`, or straight to
/// `Failed` when the start request is rejected). A user stop freezes the
/// session without changing `status`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSession {
    pub workflow_id: String,
    run_id: Option<String>,
    status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    stopped: bool,
}

impl RunSession {
    /// A fresh session for `workflow_id`, started now.
    pub fn begin(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// True while the run is live: running and not stopped by the user.
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running && !self.stopped
    }

    /// Records the server-assigned run id. Only the first assignment is kept.
    pub fn assign_run_id(&mut self, run_id: impl Into<String>) -> bool {
        if self.run_id.is_some() {
            return false;
        }
        self.run_id = Some(run_id.into());
        true
    }

    /// Moves to `next` when it lies further along the lifecycle.
    ///
    /// Terminal statuses also stamp `end_time`. Returns whether the status changed.
    pub fn advance(&mut self, next: RunStatus) -> bool {
        if next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        if next.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        true
    }

    /// Freezes the session after a user stop.
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    /// `end - start` once ended, `now - start` while in progress.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or(now);
        Some((end - start).to_std().unwrap_or(Duration::ZERO))
    }

    /// Elapsed time as `12.34s`, or `-` before the session started.
    pub fn elapsed_label(&self) -> String {
        self.elapsed_at(Utc::now()).map_or_else(|| "-".to_string(), format_elapsed)
    }

    /// Label of the start action: `Start` before any attempt, `Retry` afterwards.
    pub fn start_label(&self) -> &'static str {
        if self.status.is_terminal() || self.stopped { "Retry" } else { "Start" }
    }
}
