use std::{fmt, str::FromStr};

use testbench_types::{LogEntry, LogLevel, UnknownLogLevel};

use super::store::StepOption;

/// Level selection for the log view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    #[default]
    All,
    Only(LogLevel),
}

impl LevelFilter {
    pub fn matches(self, level: LogLevel) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Only(wanted) => wanted == level,
        }
    }

    /// Next option in `all -> debug -> info -> warn -> error -> all` order.
    pub fn next(self) -> Self {
        let mut levels = LogLevel::ALL.iter().copied();
        let following = match self {
            LevelFilter::All => levels.next(),
            LevelFilter::Only(current) => levels.skip_while(|level| *level != current).nth(1),
        };
        following.map_or(LevelFilter::All, LevelFilter::Only)
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelFilter::All => f.write_str("all"),
            LevelFilter::Only(level) => f.write_str(level.as_str()),
        }
    }
}

impl FromStr for LevelFilter {
    type Err = UnknownLogLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Ok(LevelFilter::All);
        }
        value.parse().map(LevelFilter::Only)
    }
}

/// Step selection for the log view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepFilter {
    #[default]
    All,
    Only(String),
}

impl StepFilter {
    pub fn matches(&self, step_id: &str) -> bool {
        match self {
            StepFilter::All => true,
            StepFilter::Only(wanted) => wanted == step_id,
        }
    }

    /// Cycles through `All` and then each of `options` in order.
    ///
    /// A selection that is no longer among the options restarts at `All`.
    pub fn next(&self, options: &[StepOption]) -> Self {
        let position = match self {
            StepFilter::All => None,
            StepFilter::Only(current) => match options.iter().position(|option| &option.step_id == current) {
                Some(index) => Some(index),
                None => return StepFilter::All,
            },
        };
        let next_index = position.map_or(0, |index| index + 1);
        options
            .get(next_index)
            .map_or(StepFilter::All, |option| StepFilter::Only(option.step_id.clone()))
    }
}

/// Combined level and step predicate.
///
/// The two predicates are independent, so the order in which they are
/// narrowed does not change the result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogFilter {
    pub level: LevelFilter,
    pub step: StepFilter,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.level.matches(entry.level) && self.step.matches(&entry.step_id)
    }

    /// Short description for the filter line, e.g. `level: warn | step: Login`.
    pub fn describe(&self, options: &[StepOption]) -> String {
        let step = match &self.step {
            StepFilter::All => "all".to_string(),
            StepFilter::Only(step_id) => options
                .iter()
                .find(|option| &option.step_id == step_id)
                .map_or_else(|| step_id.clone(), |option| option.label.clone()),
        };
        format!("level: {} | step: {}", self.level, step)
    }
}
