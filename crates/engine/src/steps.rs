//! Per-step status table fed by stream events.
//!
//! Each step id maps to one row; the latest event for a step always wins.
//! Aggregate counts are computed on demand from the rows.

use indexmap::IndexMap;
use testbench_types::{StepOutcome, StepStatus};

/// Current state of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    /// Milliseconds, set once the step completed.
    pub duration_ms: Option<u64>,
}

/// Aggregates derived from a [`StepStatusTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
}

impl StepCounts {
    /// `success / total`, with an `(n failed)` suffix when anything failed.
    pub fn progress_label(&self) -> String {
        if self.failed > 0 {
            format!("{} / {} ({} failed)", self.success, self.total, self.failed)
        } else {
            format!("{} / {}", self.success, self.total)
        }
    }
}

/// Step rows in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct StepStatusTable {
    steps: IndexMap<String, StepState>,
}

impl StepStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a step as running, creating the row if needed.
    pub fn on_step_start(&mut self, step_id: &str, step_name: &str) {
        self.steps.insert(
            step_id.to_string(),
            StepState {
                step_id: step_id.to_string(),
                step_name: step_name.to_string(),
                status: StepStatus::Running,
                duration_ms: None,
            },
        );
    }

    /// Records a step's outcome. A completion without a prior start creates the row.
    pub fn on_step_complete(&mut self, step_id: &str, step_name: &str, outcome: StepOutcome, duration_ms: u64) {
        self.steps.insert(
            step_id.to_string(),
            StepState {
                step_id: step_id.to_string(),
                step_name: step_name.to_string(),
                status: outcome.into(),
                duration_ms: Some(duration_ms),
            },
        );
    }

    pub fn get(&self, step_id: &str) -> Option<&StepState> {
        self.steps.get(step_id)
    }

    /// Step name for an id, if the step has been seen.
    pub fn step_name(&self, step_id: &str) -> Option<&str> {
        self.steps.get(step_id).map(|state| state.step_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepState> {
        self.steps.values()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn counts(&self) -> StepCounts {
        self.steps.values().fold(
            StepCounts {
                total: self.steps.len(),
                ..StepCounts::default()
            },
            |mut counts, state| {
                match state.status {
                    StepStatus::Pending => counts.pending += 1,
                    StepStatus::Running => counts.running += 1,
                    StepStatus::Success => counts.success += 1,
                    StepStatus::Failed => counts.failed += 1,
                }
                counts
            },
        )
    }
}
