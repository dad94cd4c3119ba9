use std::sync::OnceLock;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use crate::app::{App, Popup, ServiceState};
use crate::theme::Theme;

static THEME: OnceLock<Theme> = OnceLock::new();

fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::load)
}

fn accent() -> Color { theme().accent }
fn inactive() -> Color { theme().inactive }
fn success() -> Color { theme().success }
fn warning() -> Color { theme().warning }
fn text() -> Color { theme().text }
fn text_dim() -> Color { theme().text_dim }
fn bg_selected() -> Color { theme().bg_selected }
fn header() -> Color { theme().header }

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Status line
            Constraint::Length(3), // Controls
            Constraint::Min(4),    // Logs table
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_status_line(f, app, chunks[0]);
    draw_controls(f, app, chunks[1]);
    draw_logs_table(f, app, chunks[2]);
    draw_footer(f, chunks[3]);

    if app.popup == Popup::Help {
        draw_help_popup(f, app);
    }
}

fn draw_status_line(f: &mut Frame, app: &App, area: Rect) {
    let line = match app.status_message {
        Some(ref status) => Line::from(Span::styled(
            status.as_str(),
            Style::default().fg(theme().status_color(status)),
        )),
        None => Line::from(Span::styled("Ready", Style::default().fg(text_dim()))),
    };

    f.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn button(key: &'static str, label: &'static str, enabled: bool) -> Vec<Span<'static>> {
    let (key_style, label_style) = if enabled {
        (
            Style::default().fg(accent()).add_modifier(Modifier::BOLD),
            Style::default().fg(text()),
        )
    } else {
        (
            Style::default().fg(text_dim()),
            Style::default().fg(text_dim()).add_modifier(Modifier::CROSSED_OUT),
        )
    };

    vec![
        Span::styled("[", Style::default().fg(inactive())),
        Span::styled(key, key_style),
        Span::styled("] ", Style::default().fg(inactive())),
        Span::styled(label, label_style),
        Span::raw("    "),
    ]
}

fn draw_controls(f: &mut Frame, app: &App, area: Rect) {
    let (icon, state_color) = match app.state {
        ServiceState::Running => ("●", success()),
        ServiceState::Stopped => ("○", text_dim()),
        ServiceState::Starting | ServiceState::Stopping => ("◌", warning()),
    };

    let block = Block::default()
        .title(Span::styled(" Agent ", Style::default().fg(accent()).add_modifier(Modifier::BOLD)))
        .title(
            Line::from(vec![
                Span::styled(format!(" {} ", icon), Style::default().fg(state_color)),
                Span::styled(format!("{} ", app.state.label()), Style::default().fg(state_color)),
            ])
            .alignment(Alignment::Right),
        )
        .borders(Borders::ALL)
        .border_style(Style::default().fg(inactive()));

    let controls = app.controls();
    let mut spans = vec![Span::raw("  ")];
    spans.extend(button("s", "Start", controls.start));
    spans.extend(button("x", "Stop", controls.stop));
    spans.extend(button("f", "Fetch Logs", controls.fetch_logs));
    if app.fetch_in_flight {
        spans.push(Span::styled("fetching…", Style::default().fg(warning())));
    }

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_logs_table(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(Span::styled(
            format!(" Logs ({}) ", app.rows.len()),
            Style::default().fg(text()),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(inactive()));

    let header_row = Row::new(vec![
        Span::styled("ID", Style::default().fg(header())),
        Span::styled("Details", Style::default().fg(header())),
        Span::styled("Log Time", Style::default().fg(header())),
    ])
    .bottom_margin(1);

    if app.rows.is_empty() {
        let hint = if app.state == ServiceState::Running {
            "  No logs loaded. Press f to fetch."
        } else {
            "  No logs loaded."
        };
        let empty = Paragraph::new(Span::styled(hint, Style::default().fg(text_dim()))).block(block);
        f.render_widget(empty, area);
        return;
    }

    let rows: Vec<Row> = app
        .rows
        .iter()
        .map(|row| {
            // Pretty-printed details span several lines
            let details = Text::styled(row.details.as_str(), Style::default().fg(text()));
            let height = details.height().max(1) as u16;
            Row::new(vec![
                Text::styled(row.id.as_str(), Style::default().fg(text_dim())),
                details,
                Text::styled(row.log_time.as_str(), Style::default().fg(text_dim())),
            ])
            .height(height)
            .bottom_margin(1)
        })
        .collect();

    let widths = [
        Constraint::Length(38),
        Constraint::Min(20),
        Constraint::Length(22),
    ];

    let table = Table::new(rows, widths)
        .header(header_row)
        .block(block)
        .row_highlight_style(Style::default().bg(bg_selected()).fg(text()));

    let mut state = TableState::default().with_selected(Some(app.selected_row));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let hints = [
        ("s", "Start"),
        ("x", "Stop"),
        ("f", "Fetch"),
        ("↑↓", "Scroll"),
        ("?", "Help"),
        ("q", "Quit"),
    ];

    let max_hints = if area.width < 60 { 4 } else { hints.len() };

    let hint_spans: Vec<Span> = hints
        .iter()
        .take(max_hints)
        .flat_map(|(key, action)| {
            vec![
                Span::styled(*key, Style::default().fg(accent())),
                Span::styled(format!(" {} │ ", action), Style::default().fg(text_dim())),
            ]
        })
        .collect();

    f.render_widget(Paragraph::new(Line::from(hint_spans)).alignment(Alignment::Center), area);
}

fn draw_help_popup(f: &mut Frame, app: &App) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 95 } else { 60 },
        if area.height < 30 { 95 } else { 60 },
        area,
    );

    f.render_widget(Clear, popup_area);

    let heading = |s: &'static str| {
        Line::from(Span::styled(s, Style::default().fg(header()).add_modifier(Modifier::BOLD)))
    };
    let key = |k: &'static str, what: String| {
        Line::from(vec![
            Span::styled(format!("  {:<10}", k), Style::default().fg(accent())),
            Span::raw(what),
        ])
    };

    let help_text = vec![
        heading("═══ Agent ═══"),
        key("s", "Start tracking and serve the logs API".to_string()),
        key("x", "Stop the agent".to_string()),
        key("f", format!("Fetch the {} newest log entries", app.fetch_limit())),
        Line::from(""),
        heading("═══ Navigation ═══"),
        key("↑/↓ j/k", "Scroll through fetched logs".to_string()),
        key("q Ctrl-C", "Quit (stops the agent first)".to_string()),
        Line::from(""),
        heading("═══ Command Line ═══"),
        key("--init DIR", "Write a config tracking DIR".to_string()),
        key("--daemon", "Run headless until Ctrl-C".to_string()),
        key("--logs N", "Print the N newest entries as JSON".to_string()),
        key("--health", "Print worker liveness as JSON".to_string()),
        key("--exec CMD", "Queue a whitelisted command".to_string()),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", Style::default().fg(text_dim())),
            Span::styled("?", Style::default().fg(accent())),
            Span::styled("/", Style::default().fg(text_dim())),
            Span::styled("Esc", Style::default().fg(accent())),
            Span::styled(" to close", Style::default().fg(text_dim())),
        ]),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(Span::styled(" filetrack Help ", Style::default().fg(accent())))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Backend;
    use crate::client::LogsClient;
    use crate::error::AgentError;
    use async_trait::async_trait;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    struct IdleBackend;

    #[async_trait]
    impl Backend for IdleBackend {
        async fn start(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn is_running(&self) -> bool {
            false
        }
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer();

        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn app() -> App {
        let client = LogsClient::new("http://127.0.0.1:9").unwrap();
        App::new(Arc::new(IdleBackend), client, 2)
    }

    #[test]
    fn test_draws_controls_and_status() {
        let mut app = app();
        app.status_message = Some("App stopped successfully!".to_string());

        let screen = render(&app);
        assert!(screen.contains("App stopped successfully!"));
        assert!(screen.contains("Start"));
        assert!(screen.contains("Fetch Logs"));
        assert!(screen.contains("Stopped"));
    }

    #[test]
    fn test_draws_multiline_details() {
        let mut app = app();
        app.state = ServiceState::Running;
        let entries = serde_json::from_value::<Vec<crate::client::RemoteLogEntry>>(serde_json::json!([
            {"id": "abc", "details": {"action": "CREATED"}, "logTime": "2024-05-01T12:00:00Z"}
        ]))
        .unwrap();
        app.render_logs(&entries);

        let screen = render(&app);
        assert!(screen.contains("abc"));
        assert!(screen.contains("\"action\": \"CREATED\""));
        assert!(screen.contains("2024-05-01T12:00:00Z"));
    }

    #[test]
    fn test_help_popup() {
        let mut app = app();
        app.popup = Popup::Help;
        assert!(render(&app).contains("filetrack Help"));
    }
}
