use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tracing::debug;

use crate::app::{App, Focus};
use crate::client::ChatRequest;
use crate::tui::{AppEvent, StreamEvent};

const PAGE: u16 = 10;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(stream_event) => match stream_event {
            StreamEvent::Chunk(chunk) => app.append_chunk(&chunk),
            StreamEvent::Finished => app.finish_stream(),
            StreamEvent::Failed(reason) => app.fail_stream(&reason),
        },
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // An open notice swallows everything until dismissed
    if app.notice.is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
            app.dismiss_notice();
        }
        return;
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::BackTab => app.focus = app.focus.prev(),
        _ => match app.focus {
            Focus::History => handle_history_key(app, key),
            Focus::ApiKey | Focus::Developer | Focus::Message => handle_input_key(app, key),
        },
    }
}

fn handle_history_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(PAGE),
        KeyCode::PageUp => app.scroll_up(PAGE),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(PAGE)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(PAGE)
        }
        KeyCode::Char('g') => app.scroll_up(u16::MAX),
        KeyCode::Char('G') => app.scroll_down(u16::MAX),
        KeyCode::Char('i') => app.focus = Focus::Message,
        _ => {}
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Enter {
        let newline = key
            .modifiers
            .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT);
        match app.focus {
            Focus::Message if newline => {
                if let Some(input) = app.focused_input() {
                    input.insert('\n');
                }
            }
            Focus::Message => {
                if key.modifiers.is_empty() {
                    submit(app);
                }
            }
            Focus::Developer => {
                if let Some(input) = app.focused_input() {
                    input.insert('\n');
                }
            }
            Focus::ApiKey => app.focus = Focus::Message,
            Focus::History => {}
        }
        return;
    }

    let Some(input) = app.focused_input() else {
        // Message box is disabled while a response streams in
        return;
    };

    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => {}
    }
}

/// Validate the form and, if it passes, start streaming the reply
pub fn submit(app: &mut App) {
    if let Some(request) = app.begin_submit() {
        spawn_stream(app, request);
    }
}

fn spawn_stream(app: &mut App, request: ChatRequest) {
    let client = app.client.clone();
    let tx = app.event_tx.clone();

    tokio::spawn(async move {
        let chunk_tx = tx.clone();
        let result = client
            .stream_chat(&request, |chunk| {
                let _ = chunk_tx.send(AppEvent::Stream(StreamEvent::Chunk(chunk.to_string())));
            })
            .await;

        let event = match result {
            Ok(full_response) => {
                debug!(chars = full_response.chars().count(), "stream task done");
                StreamEvent::Finished
            }
            Err(e) => StreamEvent::Failed(e.to_string()),
        };
        let _ = tx.send(AppEvent::Stream(event));
    });
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
