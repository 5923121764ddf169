use std::fmt::Debug;

use ratatui::style::{Color, Modifier, Style};
use testbench_types::{LogLevel, RunStatus, StepStatus};

/// Semantic color roles used throughout the run console.
#[derive(Debug, Clone)]
pub struct ThemeRoles {
    pub background: Color,
    pub surface: Color,
    pub border: Color,

    pub text: Color,
    pub text_secondary: Color,
    pub text_muted: Color,

    pub accent_primary: Color,
    pub accent_secondary: Color,

    pub info: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    /// Debug log lines and the idle badge.
    pub neutral: Color,

    /// Foreground drawn on top of a status badge.
    pub badge_fg: Color,

    pub scrollbar_track: Color,
    pub scrollbar_thumb: Color,
}

/// Theme trait exposes semantic roles and common style builders.
pub trait Theme: Send + Sync + Debug {
    fn roles(&self) -> &ThemeRoles;

    // Text styles
    fn text_primary_style(&self) -> Style {
        Style::default().fg(self.roles().text)
    }
    fn text_secondary_style(&self) -> Style {
        Style::default().fg(self.roles().text_secondary)
    }
    fn text_muted_style(&self) -> Style {
        Style::default().fg(self.roles().text_muted)
    }

    fn border_style(&self, focused: bool) -> Style {
        let color = if focused { self.roles().accent_secondary } else { self.roles().border };
        Style::default().fg(color)
    }

    // Status styles
    fn status_info(&self) -> Style {
        Style::default().fg(self.roles().info)
    }
    fn status_success(&self) -> Style {
        Style::default().fg(self.roles().success)
    }
    fn status_warning(&self) -> Style {
        Style::default().fg(self.roles().warning)
    }
    fn status_error(&self) -> Style {
        Style::default().fg(self.roles().error)
    }

    fn accent_emphasis_style(&self) -> Style {
        Style::default().fg(self.roles().accent_primary).add_modifier(Modifier::BOLD)
    }

    /// Foreground for a log line of the given level.
    fn log_level_style(&self, level: LogLevel) -> Style {
        match level {
            LogLevel::Error => self.status_error(),
            LogLevel::Warn => self.status_warning(),
            LogLevel::Info => self.status_info(),
            LogLevel::Debug => Style::default().fg(self.roles().neutral),
        }
    }

    fn step_status_style(&self, status: StepStatus) -> Style {
        match status {
            StepStatus::Pending => self.text_muted_style(),
            StepStatus::Running => self.status_info(),
            StepStatus::Success => self.status_success(),
            StepStatus::Failed => self.status_error(),
        }
    }

    /// Filled badge for the run status.
    fn run_badge_style(&self, status: RunStatus) -> Style {
        let roles = self.roles();
        let background = match status {
            RunStatus::Idle => roles.neutral,
            RunStatus::Running => roles.info,
            RunStatus::Success => roles.success,
            RunStatus::Failed => roles.error,
        };
        Style::default().fg(roles.badge_fg).bg(background).add_modifier(Modifier::BOLD)
    }
}
