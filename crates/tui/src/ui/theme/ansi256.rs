//! Indexed-color fallback for terminals without truecolor support.

use ratatui::style::Color;

use super::roles::{Theme, ThemeRoles};

#[derive(Debug, Clone)]
pub struct Ansi256Theme {
    roles: ThemeRoles,
}

impl Ansi256Theme {
    pub fn new() -> Self {
        Self {
            roles: ThemeRoles {
                background: Color::Indexed(236),
                surface: Color::Indexed(236),
                border: Color::Indexed(239),

                text: Color::Indexed(255),
                text_secondary: Color::Indexed(250),
                text_muted: Color::Indexed(247),

                accent_primary: Color::Indexed(212),
                accent_secondary: Color::Indexed(117),

                info: Color::Indexed(75),
                success: Color::Indexed(84),
                warning: Color::Indexed(227),
                error: Color::Indexed(203),
                neutral: Color::Indexed(245),

                badge_fg: Color::Indexed(235),

                scrollbar_track: Color::Indexed(239),
                scrollbar_thumb: Color::Indexed(61),
            },
        }
    }
}

impl Default for Ansi256Theme {
    fn default() -> Self {
        Self::new()
    }
}

impl Theme for Ansi256Theme {
    fn roles(&self) -> &ThemeRoles {
        &self.roles
    }
}
