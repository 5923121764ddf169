use ratatui::{
    style::{Modifier, Style},
    text::Span,
    widgets::{Block, BorderType, Borders},
};

use super::roles::{Theme, ThemeRoles};

/// Bordered panel with an optional bold title.
pub fn block<'a, T: Theme + ?Sized>(theme: &'a T, title: Option<String>, focused: bool) -> Block<'a> {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(theme.border_style(focused))
        .style(panel_style(theme));
    if let Some(title) = title {
        block = block.title(Span::styled(title, theme.text_secondary_style().add_modifier(Modifier::BOLD)));
    }
    block
}

/// Style for panel-like containers.
pub fn panel_style<T: Theme + ?Sized>(theme: &T) -> Style {
    let ThemeRoles { surface, text, .. } = *theme.roles();
    Style::default().bg(surface).fg(text)
}

pub fn table_header_style<T: Theme + ?Sized>(theme: &T) -> Style {
    theme.text_secondary_style().add_modifier(Modifier::BOLD)
}
