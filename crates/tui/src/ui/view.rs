//! Frame rendering for the run console.
//!
//! Layout, top to bottom: header, status bar, step table, log panel, hints.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState, Table},
};
use testbench_engine::format_message;
use testbench_types::LogEntry;
use testbench_util::format_log_time;
use unicode_width::UnicodeWidthStr;

use crate::{
    app::App,
    ui::theme::{
        Theme,
        theme_helpers::{block, table_header_style},
    },
};

/// Step table never grows past this many rows before the log panel.
const MAX_STEP_ROWS: u16 = 8;

const HINTS: [(&str, &str); 7] = [
    ("s", "start/retry"),
    ("x", "stop"),
    ("l", "level"),
    ("t", "step"),
    ("c", "clear"),
    ("f", "follow"),
    ("q", "quit"),
];

pub fn draw(frame: &mut Frame, app: &mut App, theme: &dyn Theme) {
    let area = frame.area();
    frame.render_widget(Paragraph::new("").style(Style::default().bg(theme.roles().background)), area);

    let step_rows = (app.controller().steps().len() as u16).clamp(1, MAX_STEP_ROWS);
    let [header, status, steps, logs, hints] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(step_rows + 3),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header, app, theme);
    render_status(frame, status, app, theme);
    render_steps(frame, steps, app, theme);
    render_logs(frame, logs, app, theme);
    render_hints(frame, hints, theme);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App, theme: &dyn Theme) {
    let controller = app.controller();
    let mut spans = vec![
        Span::styled(" Testbench ", theme.accent_emphasis_style()),
        Span::styled(app.request().display_name().to_string(), theme.text_primary_style().add_modifier(Modifier::BOLD)),
    ];
    if let Some(run_id) = controller.session().run_id() {
        spans.push(Span::styled(format!("  run {run_id}"), theme.text_muted_style()));
    }
    if controller.is_live() {
        spans.push(Span::styled("  ● Live", theme.status_success().add_modifier(Modifier::BOLD)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App, theme: &dyn Theme) {
    let session = app.controller().session();
    let status = session.status();
    let mut spans = vec![
        Span::styled(format!(" {} ", status.label()), theme.run_badge_style(status)),
        Span::styled("  Steps ", theme.text_secondary_style()),
        Span::styled(app.controller().steps().counts().progress_label(), theme.text_primary_style()),
        Span::styled("  Elapsed ", theme.text_secondary_style()),
        Span::styled(session.elapsed_label(), theme.text_primary_style()),
        Span::styled("  [s] ", theme.accent_emphasis_style()),
        Span::styled(session.start_label(), theme.text_primary_style()),
    ];
    if session.is_stopped() {
        spans.push(Span::styled("  stopped", theme.status_warning()));
    }
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(format!("  {notice}"), theme.status_warning()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_steps(frame: &mut Frame, area: Rect, app: &App, theme: &dyn Theme) {
    let table = app.controller().steps();
    let rows: Vec<Row> = table
        .iter()
        .map(|step| {
            let duration = step.duration_ms.map(|ms| format!("{ms} ms")).unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(step.step_name.clone()).style(theme.text_primary_style()),
                Cell::from(step.status.as_str()).style(theme.step_status_style(step.status)),
                Cell::from(duration).style(theme.text_muted_style()),
            ])
        })
        .collect();
    let header = Row::new(vec!["Step", "Status", "Duration"]).style(table_header_style(theme));
    let widths = [Constraint::Percentage(60), Constraint::Length(10), Constraint::Length(12)];
    let title = format!("Steps ({})", table.len());

    if rows.is_empty() {
        let empty = Paragraph::new(Span::styled("No steps reported yet.", theme.text_muted_style()))
            .block(block(theme, Some(title), false));
        frame.render_widget(empty, area);
        return;
    }
    let widget = Table::new(rows, widths).header(header).block(block(theme, Some(title), false));
    frame.render_widget(widget, area);
}

fn render_logs(frame: &mut Frame, area: Rect, app: &mut App, theme: &dyn Theme) {
    let logs = app.controller().logs();
    let options = logs.steps();
    let title = format!("Logs ({})", logs.count_label(&app.filter));
    let panel = block(theme, Some(title), app.follow);
    let inner = panel.inner(area);
    frame.render_widget(panel, area);

    let [filter_area, list_area] = Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(inner);
    let follow = if app.follow { "  follow: on" } else { "  follow: off" };
    let filter_line = Line::from(vec![
        Span::styled(app.filter.describe(&options), theme.text_secondary_style()),
        Span::styled(follow, theme.text_muted_style()),
    ]);
    frame.render_widget(Paragraph::new(filter_line), filter_area);

    let lines: Vec<Line> = logs.filtered(&app.filter).flat_map(|entry| entry_lines(entry, theme)).collect();
    if lines.is_empty() {
        frame.render_widget(Paragraph::new(Span::styled("No log entries.", theme.text_muted_style())), list_area);
        app.max_scroll = 0;
        app.scroll = 0;
        return;
    }

    let viewport = list_area.height as usize;
    let content_len = lines.len();
    app.max_scroll = content_len.saturating_sub(viewport);
    app.scroll = if app.follow { app.max_scroll } else { app.scroll.min(app.max_scroll) };

    let offset = u16::try_from(app.scroll).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(lines).scroll((offset, 0)), list_area);

    if app.max_scroll > 0 {
        let mut scrollbar_state = ScrollbarState::new(app.max_scroll)
            .position(app.scroll)
            .viewport_content_length(viewport);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_style(Style::default().fg(theme.roles().scrollbar_thumb))
            .track_style(Style::default().fg(theme.roles().scrollbar_track));
        frame.render_stateful_widget(scrollbar, list_area, &mut scrollbar_state);
    }
}

/// `HH:MM:SS.mmm LEVEL [step] message`, continuation lines aligned under the message.
fn entry_lines(entry: &LogEntry, theme: &dyn Theme) -> Vec<Line<'static>> {
    let level_style = theme.log_level_style(entry.level);
    let time = format_log_time(&entry.timestamp);
    let level = format!("{:<5}", entry.level.label());
    let step = format!("[{}]", entry.step_label());
    let indent = " ".repeat(time.width() + level.width() + step.width() + 3);

    let message = format_message(&entry.message);
    let mut rows = message.lines();
    let first = rows.next().unwrap_or_default().to_string();
    let mut lines = vec![Line::from(vec![
        Span::styled(time, theme.text_muted_style()),
        Span::raw(" "),
        Span::styled(level, level_style.add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(step, theme.text_secondary_style()),
        Span::raw(" "),
        Span::styled(first, level_style),
    ])];
    lines.extend(rows.map(|row| Line::from(vec![Span::raw(indent.clone()), Span::styled(row.to_string(), level_style)])));
    lines
}

fn render_hints(frame: &mut Frame, area: Rect, theme: &dyn Theme) {
    let mut spans = Vec::with_capacity(HINTS.len() * 2);
    for (key, label) in HINTS {
        spans.push(Span::styled(format!(" {key} "), theme.accent_emphasis_style()));
        spans.push(Span::styled(format!("{label} "), theme.text_muted_style()));
    }
    spans.push(Span::styled(" ↑↓ PgUp PgDn ", theme.accent_emphasis_style()));
    spans.push(Span::styled("scroll", theme.text_muted_style()));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
