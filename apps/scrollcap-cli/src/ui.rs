use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use scrollcap_types::events::{CaptureEvent, EventPayload};

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Event(CaptureEvent),
    Shutdown,
}

pub fn run(receiver: Receiver<UiMessage>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    summary: &str,
) -> Result<()> {
    let mut logs: VecDeque<String> = VecDeque::with_capacity(MAX_LOG_ENTRIES);
    let mut last_status = String::from("waiting");
    let mut should_close = false;

    loop {
        let mut receiver_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => {
                    last_status = summarize_status(&event);
                    let formatted = format_event(&event);
                    if logs.len() == MAX_LOG_ENTRIES {
                        logs.pop_front();
                    }
                    logs.push_back(formatted);
                }
                Ok(UiMessage::Shutdown) => {
                    should_close = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    receiver_closed = true;
                    should_close = true;
                    break;
                }
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "ScrollCap",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(last_status.clone()),
                Span::raw("  "),
                Span::styled("config:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" to quit"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("status"));
            f.render_widget(header, chunks[0]);

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();

            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("recent events"))
                .highlight_style(Style::default().fg(Color::Yellow));

            f.render_widget(list, chunks[1]);
        })?;

        if should_close && receiver_closed {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }

        if should_close && receiver_closed {
            break;
        }
    }

    Ok(())
}

fn summarize_status(event: &CaptureEvent) -> String {
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!("phase: {:?}", lifecycle.phase),
        EventPayload::Frame(frame) => {
            format!("frame {} at y={}", frame.index, frame.document_y)
        }
        EventPayload::Progress(progress) => format!("progress {}%", progress.percent_complete),
        EventPayload::Delivery(delivery) => format!("saved {} bytes", delivery.bytes),
        EventPayload::Ops(_) => "ops note".to_string(),
    }
}

fn format_event(event: &CaptureEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] Lifecycle::{:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Frame(frame) => format!(
            "[{}] Frame {} captured at document y={}",
            timestamp, frame.index, frame.document_y
        ),
        EventPayload::Progress(progress) => format!(
            "[{}] Progress {}/{} frames ({}%)",
            timestamp,
            progress.frames_captured,
            progress.frames_expected,
            progress.percent_complete
        ),
        EventPayload::Delivery(delivery) => format!(
            "[{}] Delivered {} ({} bytes)",
            timestamp, delivery.location, delivery.bytes
        ),
        EventPayload::Ops(ops) => format!(
            "[{}] Ops {} [{}]",
            timestamp,
            ops.message,
            ops.tags.join(", ")
        ),
    }
}
