//! Run log storage and its filtered projection.
//!
//! [`LogStore`] owns the append-only sequence of [`LogEntry`] records for a
//! run. [`LogFilter`] selects a subsequence by level and step without
//! touching the store, and [`format_message`] pretty-prints an embedded JSON
//! fragment for display.
//!
//! [`LogEntry`]: testbench_types::LogEntry

pub mod filter;
pub mod format;
pub mod store;

pub use filter::{LevelFilter, LogFilter, StepFilter};
pub use format::format_message;
pub use store::{LogStore, StepOption};
