use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};

use crate::app::{App, Focus, TextInput};
use crate::config::mask_key;
use crate::markdown::render_markdown;
use crate::state::{format_time, ChatMessage, ChatRole};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, settings, chat, input, footer
    let [header_area, settings_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(5),
        Constraint::Min(3),
        Constraint::Length(5),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [key_area, developer_area] = Layout::horizontal([
        Constraint::Percentage(40),
        Constraint::Percentage(60),
    ])
    .areas(settings_area);

    render_api_key(app, frame, key_area);
    render_text_input(
        frame,
        developer_area,
        &app.developer_message,
        " System/Developer Message ",
        app.focus == Focus::Developer,
        false,
        "Instructions for the assistant...",
    );
    render_chat(app, frame, chat_area);
    render_text_input(
        frame,
        input_area,
        &app.user_message,
        if app.is_loading { " Message (waiting for reply) " } else { " Message " },
        app.focus == Focus::Message,
        app.is_loading,
        "Type your message here... (Enter to send, Shift+Enter for new line)",
    );
    render_footer(app, frame, footer_area);

    if let Some(notice) = &app.notice {
        render_notice(notice, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" 🤖 streamchat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("· {} ", app.model), Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn border_color(focused: bool) -> Color {
    if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

fn render_api_key(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::ApiKey;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(focused)))
        .title(" 🔑 API Key ");

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let masked = mask_key(&app.api_key.text);
    let key_line = if masked.is_empty() {
        Line::from(Span::styled(
            "Enter your OpenAI API key...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(Span::styled(masked.clone(), Style::default().fg(Color::Cyan)))
    };
    let hint = Line::from(Span::styled(
        "Kept in memory; only sent to the chat endpoint",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(vec![key_line, Line::default(), hint]), inner);

    if focused && app.notice.is_none() {
        let cursor_x = (masked.chars().count() as u16).min(inner.width.saturating_sub(1));
        frame.set_cursor_position((inner.x + cursor_x, inner.y));
    }
}

/// Multi-line text box that keeps the cursor in view
fn render_text_input(
    frame: &mut Frame,
    area: Rect,
    input: &TextInput,
    title: &str,
    focused: bool,
    disabled: bool,
    placeholder: &str,
) {
    let color = if disabled {
        Color::DarkGray
    } else if focused {
        Color::Yellow
    } else {
        Color::Gray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(focused && !disabled)))
        .title(title.to_string());

    let inner = block.inner(area);

    if input.text.is_empty() {
        let hint = Paragraph::new(placeholder.to_string())
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(hint, area);
    } else {
        let (row, col) = input.cursor_row_col();
        let row_offset = row.saturating_sub(inner.height.saturating_sub(1) as usize);
        let col_offset = col.saturating_sub(inner.width.saturating_sub(1) as usize);

        let text: Vec<Line> = input.text.split('\n').map(|l| Line::from(l.to_string())).collect();
        let paragraph = Paragraph::new(text)
            .style(Style::default().fg(color))
            .block(block)
            .scroll((row_offset as u16, col_offset as u16));
        frame.render_widget(paragraph, area);
    }

    if focused && !disabled {
        let (row, col) = input.cursor_row_col();
        let row = row.min(inner.height.saturating_sub(1) as usize) as u16;
        let col = col.min(inner.width.saturating_sub(1) as usize) as u16;
        frame.set_cursor_position((inner.x + col, inner.y + row));
    }
}

fn role_header(message_role: ChatRole, time: Option<String>) -> Line<'static> {
    let style = match message_role {
        ChatRole::User => Style::default().fg(Color::Cyan),
        ChatRole::Assistant => Style::default().fg(Color::Yellow),
        ChatRole::System => Style::default().fg(Color::Magenta),
    }
    .add_modifier(Modifier::BOLD);

    let mut spans = vec![Span::styled(format!("{}:", message_role.label()), style)];
    if let Some(time) = time {
        spans.push(Span::styled(format!(" {}", time), Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}

fn message_lines(message: &ChatMessage) -> Vec<Line<'static>> {
    let mut lines = vec![role_header(message.role, Some(format_time(&message.timestamp)))];
    match message.role {
        // User text is shown exactly as typed
        ChatRole::User => {
            lines.extend(message.content.lines().map(|l| Line::from(l.to_string())));
        }
        ChatRole::Assistant => lines.extend(render_markdown(&message.content)),
        ChatRole::System => {
            lines.extend(message.content.lines().map(|l| {
                Line::from(Span::styled(
                    l.to_string(),
                    Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
                ))
            }));
        }
    }
    lines.push(Line::default());
    lines
}

/// Build every line of the chat view, including the in-progress reply.
///
/// Committed messages are rendered once and kept in `app.rendered_messages`.
pub fn chat_lines(app: &mut App) -> Vec<Line<'static>> {
    while app.rendered_messages.len() < app.conversation.len() {
        let message = &app.conversation.messages()[app.rendered_messages.len()];
        let rendered = message_lines(message);
        app.rendered_messages.push(rendered);
    }

    let mut lines: Vec<Line<'static>> = app.rendered_messages.iter().flatten().cloned().collect();

    if app.is_loading {
        lines.push(role_header(ChatRole::Assistant, None));
        if app.current_response.is_empty() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            lines.extend(app.live_markdown.render(app.current_response.as_str()));
            lines.push(Line::from(Span::styled("▌", Style::default().fg(Color::Yellow))));
        }
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);

    let focused = app.focus == Focus::History;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(focused)))
        .title(" Chat ");

    let inner = block.inner(area);

    let chat_text = if app.conversation.is_empty() && !app.is_loading {
        Text::from(Span::styled(
            "Start a conversation by typing a message below.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(chat_lines(app))
    };

    // Measured with the same word wrapping the paragraph renders with
    let chat = Paragraph::new(chat_text).wrap(Wrap { trim: false });
    let content_height = chat.line_count(inner.width).min(u16::MAX as usize) as u16;
    app.update_chat_extent(content_height, inner.height);

    let chat = chat.block(block).scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);

    if app.chat_max_scroll > 0 {
        let mut state = ScrollbarState::new(app.chat_max_scroll as usize)
            .position(app.chat_scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut state,
        );
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let dimmed = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let (mode_text, mode_style) = if app.is_loading {
        (" ⏳ STREAMING ", Style::default().bg(Color::Yellow).fg(Color::Black))
    } else {
        (" 🚀 READY ", Style::default().bg(Color::Blue).fg(Color::White))
    };

    let mut hints = match app.focus {
        Focus::History => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" g/G ", key_style),
            Span::styled(" top/bottom ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" write ", label_style),
        ],
        Focus::Message => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", if app.can_send() { label_style } else { dimmed }),
            Span::styled(" Shift+Enter ", key_style),
            Span::styled(" new line ", label_style),
        ],
        Focus::Developer => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" new line ", label_style),
        ],
        Focus::ApiKey => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" done ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" Tab ", key_style),
        Span::styled(" focus ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_notice(notice: &str, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 6.min(area.height);

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Notice ");

    let text = vec![
        Line::from(notice.to_string()),
        Line::default(),
        Line::from(Span::styled(
            "Press Enter or Esc to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::TextInput;
    use crate::config::Settings;
    use ratatui::{backend::TestBackend, Terminal};
    use tokio::sync::mpsc;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = Settings {
            endpoint: "http://127.0.0.1:8000/api/chat".to_string(),
            model: "gpt-4.1-mini".to_string(),
            developer_message: "You are a helpful AI assistant.".to_string(),
            api_key: "sk-test-1234".to_string(),
        };
        App::new(&settings, tx)
    }

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn in_progress_reply_is_rendered_as_markdown() {
        let mut app = test_app();
        app.user_message = TextInput::with_text("**not bold** for users");
        app.begin_submit().expect("request");
        app.append_chunk("## Answer\n- item");

        let rendered: Vec<String> = chat_lines(&mut app).iter().map(line_text).collect();
        assert!(rendered.iter().any(|l| l == "**not bold** for users"));
        assert!(rendered.iter().any(|l| l == "Answer"));
        assert!(rendered.iter().any(|l| l == "• item"));
    }

    #[test]
    fn thinking_indicator_before_first_chunk() {
        let mut app = test_app();
        app.user_message = TextInput::with_text("hi");
        app.begin_submit().expect("request");

        let rendered: Vec<String> = chat_lines(&mut app).iter().map(line_text).collect();
        assert_eq!(rendered.last().map(String::as_str), Some("Thinking."));
    }

    #[test]
    fn draws_without_panicking_and_follows_tail() {
        let mut app = test_app();
        app.user_message = TextInput::with_text("hi");
        app.begin_submit().expect("request");
        app.append_chunk(&"line\n\n".repeat(100));
        app.notice = Some("Please enter both API key and message".to_string());

        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert!(app.chat_max_scroll > 0);
        assert_eq!(app.chat_scroll, app.chat_max_scroll);
    }

    fn screen_rows(terminal: &Terminal<TestBackend>) -> Vec<String> {
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    #[test]
    fn word_wrapped_reply_keeps_its_last_line_visible() {
        let mut app = test_app();
        app.user_message = TextInput::with_text("hi");
        app.begin_submit().expect("request");
        let line = "aaaaaaaaaaaaaaaaaaaa bbbbbbbbbbbbbbbbbbbb cccccccccccccccccccc\n";
        for _ in 0..40 {
            app.append_chunk(line);
        }
        app.append_chunk("FINALTOKEN");

        // 38 columns inside the borders: each source line takes three rows
        // when wrapped at word boundaries, not two
        let mut terminal = Terminal::new(TestBackend::new(40, 30)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert_eq!(app.chat_scroll, app.chat_max_scroll);
        let rows = screen_rows(&terminal);
        assert!(
            rows.iter().any(|row| row.contains("FINALTOKEN")),
            "last streamed line is off screen:\n{}",
            rows.join("\n")
        );
    }

    #[test]
    fn committed_messages_are_rendered_once() {
        let mut app = test_app();
        app.user_message = TextInput::with_text("hi");
        app.begin_submit().expect("request");
        app.append_chunk("```rust\nfn main() {}\n```");
        app.finish_stream();

        let first: Vec<String> = chat_lines(&mut app).iter().map(line_text).collect();
        assert_eq!(app.rendered_messages.len(), 2);
        let second: Vec<String> = chat_lines(&mut app).iter().map(line_text).collect();
        assert_eq!(first, second);
        assert!(first.iter().any(|l| l == "│ fn main() {}"));
    }
}
