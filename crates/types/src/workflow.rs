//! Workflow run types shared by the API client, the run engine, and the UI.
//!
//! Payload structs mirror the JSON emitted by the platform's execution
//! service (camelCase field names). The live stream is modelled as the tagged
//! [`StreamEvent`] enum so that consumers never inspect untyped payloads.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value as JsonValue;

pub mod stream;

/// Current status of a single workflow step as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome reported by a `step_complete` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Failed,
}

impl From<StepOutcome> for StepStatus {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Success => StepStatus::Success,
            StepOutcome::Failed => StepStatus::Failed,
        }
    }
}

/// Lifecycle status of one execution attempt.
///
/// Transitions only move forward: `Idle -> Running -> {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    /// Returns `true` when the run has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    /// Position in the lifecycle, used to reject backward transitions.
    pub fn rank(self) -> u8 {
        match self {
            RunStatus::Idle => 0,
            RunStatus::Running => 1,
            RunStatus::Success | RunStatus::Failed => 2,
        }
    }

    /// Badge label shown in the run console.
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Idle => "Ready",
            RunStatus::Running => "Running",
            RunStatus::Success => "Success",
            RunStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Run record returned by `POST /workflows/{id}/execute` and `GET /workflows/runs/{runId}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Total duration in milliseconds.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl WorkflowRunRecord {
    /// The only server status that counts as a successful run.
    pub const COMPLETED: &'static str = "completed";

    pub fn is_completed(&self) -> bool {
        self.status == Self::COMPLETED
    }
}

/// Paginated list envelope used by the platform's list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

impl<T> Paginated<T> {
    /// One-based page number derived from `offset` and `limit`.
    pub fn page(&self) -> u64 {
        if self.limit == 0 { 1 } else { self.offset / self.limit + 1 }
    }

    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 { 0 } else { self.total.div_ceil(self.limit) }
    }
}

/// One-based page selection converted to `limit`/`offset` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u64 = 20;

    /// Returns `(limit, offset)`. A page of `0` is treated as the first page.
    pub fn limit_offset(self) -> (u64, u64) {
        let page = self.page.max(1);
        let page_size = if self.page_size == 0 { Self::DEFAULT_PAGE_SIZE } else { self.page_size };
        (page_size, (page - 1) * page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Payload of a `step_start` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStartPayload {
    pub step_id: String,
    pub step_name: String,
}

/// Payload of a `step_complete` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletePayload {
    pub step_id: String,
    pub step_name: String,
    pub status: StepOutcome,
    /// Step duration in milliseconds.
    #[serde(deserialize_with = "deserialize_millis")]
    pub duration: u64,
}

/// Payload of a `step_log` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogPayload {
    pub step_id: String,
    pub level: crate::LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Kind of mutation reported by a `variable_change` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableChangeType {
    Create,
    Update,
    Delete,
}

impl VariableChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableChangeType::Create => "create",
            VariableChangeType::Update => "update",
            VariableChangeType::Delete => "delete",
        }
    }
}

/// Payload of a `variable_change` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableChangePayload {
    pub step_id: String,
    pub change_type: VariableChangeType,
    pub var_name: String,
    #[serde(default)]
    pub old_value: Option<JsonValue>,
    #[serde(default)]
    pub new_value: JsonValue,
}

/// A decoded live-stream event, one variant per message kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StepStart(StepStartPayload),
    StepComplete(StepCompletePayload),
    StepLog(StepLogPayload),
    VariableChange(VariableChangePayload),
}

impl StreamEvent {
    /// Step the event refers to.
    pub fn step_id(&self) -> &str {
        match self {
            StreamEvent::StepStart(payload) => &payload.step_id,
            StreamEvent::StepComplete(payload) => &payload.step_id,
            StreamEvent::StepLog(payload) => &payload.step_id,
            StreamEvent::VariableChange(payload) => &payload.step_id,
        }
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::StepStart(_) => "step_start",
            StreamEvent::StepComplete(_) => "step_complete",
            StreamEvent::StepLog(_) => "step_log",
            StreamEvent::VariableChange(_) => "variable_change",
        }
    }
}

/// Everything a live subscription can deliver, in transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    /// The channel is established.
    Opened,
    /// A recognised event.
    Event(StreamEvent),
    /// A message that did not match any known shape; carries the reason.
    Unrecognized(String),
    /// A transport-level error. Always followed by `Closed`.
    Error(String),
    /// The channel ended (server-initiated or network-level).
    Closed,
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_u64()
        .or_else(|| number.as_f64().filter(|value| value.is_finite() && *value >= 0.0).map(|value| value.round() as u64))
        .ok_or_else(|| de::Error::custom(format!("invalid duration: {number}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_rank_is_monotonic() {
        assert!(RunStatus::Idle.rank() < RunStatus::Running.rank());
        assert!(RunStatus::Running.rank() < RunStatus::Success.rank());
        assert_eq!(RunStatus::Success.rank(), RunStatus::Failed.rank());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn run_record_ignores_unknown_fields() {
        let record: WorkflowRunRecord = serde_json::from_str(
            r#"{"id":7,"runId":"run-7","workflowId":"wf-1","status":"completed","startTime":"2024-01-01T00:00:00Z","tenant":"x"}"#,
        )
        .expect("deserialize run record");
        assert_eq!(record.run_id, "run-7");
        assert!(record.is_completed());
        assert_eq!(record.end_time, None);
    }

    #[test]
    fn page_request_converts_to_limit_offset() {
        assert_eq!(PageRequest { page: 3, page_size: 10 }.limit_offset(), (10, 20));
        assert_eq!(PageRequest { page: 0, page_size: 0 }.limit_offset(), (20, 0));
    }

    #[test]
    fn paginated_reports_page_numbers() {
        let page: Paginated<u8> = Paginated {
            data: vec![],
            total: 45,
            limit: 20,
            offset: 40,
        };
        assert_eq!(page.page(), 3);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn step_complete_accepts_fractional_duration() {
        let payload: StepCompletePayload =
            serde_json::from_str(r#"{"stepId":"s1","stepName":"Login","status":"failed","duration":119.6}"#).unwrap();
        assert_eq!(payload.duration, 120);
        assert_eq!(StepStatus::from(payload.status), StepStatus::Failed);
    }

    #[test]
    fn stream_events_expose_kind_and_step() {
        let event = StreamEvent::StepLog(StepLogPayload {
            step_id: "s2".into(),
            level: crate::LogLevel::Warn,
            message: "slow".into(),
            timestamp: None,
        });
        assert_eq!((event.kind(), event.step_id()), ("step_log", "s2"));
    }
}
