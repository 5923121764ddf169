use ratatui::style::Color;

use super::roles::{Theme, ThemeRoles};

// Dracula palette (https://draculatheme.com/contribute)
pub const BG: Color = Color::Rgb(0x28, 0x2A, 0x36); // #282a36
pub const CURRENT_LINE: Color = Color::Rgb(0x44, 0x47, 0x5A); // #44475a
pub const FOREGROUND: Color = Color::Rgb(0xF8, 0xF8, 0xF2); // #f8f8f2
pub const COMMENT: Color = Color::Rgb(0x62, 0x72, 0xA4); // #6272a4

pub const CYAN: Color = Color::Rgb(0x8B, 0xE9, 0xFD); // #8be9fd
pub const GREEN: Color = Color::Rgb(0x50, 0xFA, 0x7B); // #50fa7b
pub const PINK: Color = Color::Rgb(0xFF, 0x79, 0xC6); // #ff79c6
pub const RED: Color = Color::Rgb(0xFF, 0x55, 0x55); // #ff5555
pub const YELLOW: Color = Color::Rgb(0xF1, 0xFA, 0x8C); // #f1fa8c

// Dracula has no pure blue; info lines use a blue between comment and cyan.
pub const BLUE: Color = Color::Rgb(0x6C, 0x9E, 0xF8);
pub const GREY: Color = Color::Rgb(0x8A, 0x8F, 0xA3);

/// Default theme tuned for dark truecolor terminals.
#[derive(Debug, Clone)]
pub struct DraculaTheme {
    roles: ThemeRoles,
}

impl DraculaTheme {
    pub fn new() -> Self {
        Self {
            roles: ThemeRoles {
                background: BG,
                surface: BG,
                border: CURRENT_LINE,

                text: FOREGROUND,
                text_secondary: COMMENT,
                text_muted: COMMENT,

                accent_primary: PINK,
                accent_secondary: CYAN,

                info: BLUE,
                success: GREEN,
                warning: YELLOW,
                error: RED,
                neutral: GREY,

                badge_fg: BG,

                scrollbar_track: CURRENT_LINE,
                scrollbar_thumb: COMMENT,
            },
        }
    }
}

impl Default for DraculaTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl Theme for DraculaTheme {
    fn roles(&self) -> &ThemeRoles {
        &self.roles
    }
}
