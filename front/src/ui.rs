use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use tally_api::v1::{Priority, Todo};

use crate::state::{App, Mode};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_status(frame, app, chunks[0]);
    draw_prompt(frame, app, chunks[1]);
    draw_list(frame, app, chunks[2]);
    draw_summary(frame, app, chunks[3]);
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let color = match app.server_status.as_str() {
        "connected" => Color::Green,
        "checking" | "connecting" => Color::Yellow,
        _ => Color::Red,
    };

    let mut spans = vec![
        Span::styled("tally", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  server: "),
        Span::styled(app.server_status.as_str(), Style::default().fg(color)),
    ];

    if let Some(info) = &app.db_info {
        spans.push(Span::styled(
            format!("  |  db: {}", info.database),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let line = Line::from(spans);

    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn draw_prompt(frame: &mut Frame, app: &App, area: Rect) {
    let (text, title, color) = match &app.mode {
        Mode::Input => (
            app.input.as_str(),
            "New todo (Enter to add, Esc to cancel)",
            Color::White,
        ),
        Mode::Edit { draft, .. } => (
            draft.as_str(),
            "Edit title (Enter to save, Esc to cancel)",
            Color::White,
        ),
        Mode::ConfirmDelete { .. } => ("Delete this todo? (y/n)", "Confirm", Color::Red),
        Mode::Normal => match app.error {
            Some(message) => (message, "Error (x to dismiss)", Color::Red),
            None => (
                "a: add  e: edit  d: delete  space: toggle",
                "Keys",
                Color::DarkGray,
            ),
        },
    };

    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(color))
            .block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn draw_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app.todos.iter().map(todo_item).collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Todos"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if !app.todos.is_empty() {
        state.select(Some(app.selected));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

fn todo_item(todo: &Todo) -> ListItem<'_> {
    let mark = if todo.completed { "[x] " } else { "[ ] " };

    let title_style = if todo.completed {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };

    let mut spans = vec![
        Span::raw(mark),
        Span::styled(todo.title.as_str(), title_style),
        Span::styled(
            format!("  ({})", todo.priority.as_str()),
            Style::default().fg(priority_color(todo.priority)),
        ),
    ];

    if let Some(due) = todo.due_date {
        spans.push(Span::styled(
            format!("  due {}", due.format("%Y-%m-%d")),
            Style::default().fg(Color::Blue),
        ));
    }

    ListItem::new(Line::from(spans))
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Low => Color::Green,
        Priority::Medium => Color::Yellow,
        Priority::High => Color::Red,
    }
}

fn draw_summary(frame: &mut Frame, app: &App, area: Rect) {
    let completed = app.todos.iter().filter(|todo| todo.completed).count();

    let mut summary = format!("{} todos, {} completed", app.todos.len(), completed);

    if let Some(info) = &app.db_info {
        summary.push_str(&format!(
            "  |  total items in database: {}",
            info.stats.objects,
        ));
    }

    summary.push_str("  |  q: quit  r: refresh");

    frame.render_widget(
        Paragraph::new(summary).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}
