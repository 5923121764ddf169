use chrono::Utc;
use testbench_types::{LogEntry, LogLevel, SYSTEM_STEP_ID};

use super::filter::LogFilter;

/// Step choice offered by the step filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOption {
    pub step_id: String,
    /// Step name when one was recorded, otherwise the id.
    pub label: String,
}

/// Append-only, in-memory log of one run.
///
/// Entry ids are `log-<n>` with `n` increasing for the lifetime of the store,
/// so an id is never handed out twice, even across [`LogStore::clear`].
#[derive(Debug, Default)]
pub struct LogStore {
    entries: Vec<LogEntry>,
    next_sequence: u64,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry stamped with the current time and returns it.
    ///
    /// Duplicate deliveries are stored as separate entries.
    pub fn append(&mut self, step_id: impl Into<String>, step_name: Option<String>, level: LogLevel, message: impl Into<String>) -> &LogEntry {
        self.next_sequence += 1;
        let entry = LogEntry {
            id: format!("log-{}", self.next_sequence),
            step_id: step_id.into(),
            step_name,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Appends an entry attributed to the client itself.
    pub fn system(&mut self, level: LogLevel, message: impl Into<String>) -> &LogEntry {
        self.append(SYSTEM_STEP_ID, None, level, message)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the clear action should be offered.
    pub fn can_clear(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Drops every entry. Returns `false` (and does nothing) when already empty.
    pub fn clear(&mut self) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.entries.clear();
        true
    }

    /// Entries matching `filter`, in insertion order.
    pub fn filtered<'a>(&'a self, filter: &'a LogFilter) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |entry| filter.matches(entry))
    }

    /// `"<filtered> / <total>"` for the log header.
    pub fn count_label(&self, filter: &LogFilter) -> String {
        format!("{} / {}", self.filtered(filter).count(), self.entries.len())
    }

    /// Distinct step ids in order of first appearance.
    pub fn steps(&self) -> Vec<StepOption> {
        let mut options: Vec<StepOption> = Vec::new();
        for entry in &self.entries {
            match options.iter_mut().find(|option| option.step_id == entry.step_id) {
                Some(option) => {
                    if option.label == option.step_id
                        && let Some(name) = entry.step_name.as_deref()
                    {
                        option.label = name.to_string();
                    }
                }
                None => options.push(StepOption {
                    step_id: entry.step_id.clone(),
                    label: entry.step_label().to_string(),
                }),
            }
        }
        options
    }
}
