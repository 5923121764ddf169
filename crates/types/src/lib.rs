//! # Testbench Types
//!
//! Shared type definitions used across the Testbench workspace. The types in
//! this crate describe data that crosses crate boundaries: log records shown
//! in the run console, step and run statuses, the execution API's run records,
//! the live stream's event payloads, and data bindings between workflow steps.
//!
//! Everything here is plain data with serde support. Behaviour (log storage,
//! status reconciliation, binding edits) lives in `testbench-engine`.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod bindings;
pub mod workflow;

pub use bindings::{DataBinding, DataField, DataTransform, MappingDocument, StepEndpoint};
pub use workflow::{
    PageRequest, Paginated, RunStatus, StepCompletePayload, StepLogPayload, StepOutcome, StepStartPayload, StepStatus, StreamEvent,
    StreamNotice, VariableChangePayload, VariableChangeType, WorkflowRunRecord,
    stream::{StreamDecodeError, StreamMessage, decode_stream_message},
};

/// Step identifier used for entries produced by the client itself rather than a workflow step.
pub const SYSTEM_STEP_ID: &str = "system";

/// Severity attached to a log entry.
///
/// The ordering follows verbosity, so `Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// All levels in ascending severity.
    pub const ALL: [LogLevel; 4] = [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error];

    /// Lowercase wire name (`debug`, `info`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Uppercase label used in rendered log lines.
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown log level name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLogLevel(pub String);

impl fmt::Display for UnknownLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'; expected one of debug, info, warn, error", self.0)
    }
}

impl std::error::Error for UnknownLogLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(UnknownLogLevel(value.to_string())),
        }
    }
}

/// A normalized log record shown in the run console.
///
/// Entries are append-only; insertion order is chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique within a run.
    pub id: String,
    /// Step that produced the entry, or [`SYSTEM_STEP_ID`].
    pub step_id: String,
    /// Human-readable step name when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    pub level: LogLevel,
    /// Free text; may embed a JSON fragment.
    pub message: String,
    /// Receipt time.
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Returns true when the entry was produced by the client rather than a step.
    pub fn is_system(&self) -> bool {
        self.step_id == SYSTEM_STEP_ID
    }

    /// Step name when known, otherwise the step id.
    pub fn step_label(&self) -> &str {
        self.step_name.as_deref().unwrap_or(&self.step_id)
    }
}
