use ratatui::layout::Rect;
use ratatui::text::Line;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::client::{ChatClient, ChatRequest};
use crate::config::Settings;
use crate::decoder::ResponseBuffer;
use crate::markdown::StreamingMarkdown;
use crate::state::{ChatMessage, ChatRole, Conversation};
use crate::tui::AppEvent;

pub const MISSING_INPUT_NOTICE: &str = "Please enter both API key and message";
pub const REQUEST_FAILED_NOTICE: &str =
    "Error communicating with the API. Please check your API key and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    ApiKey,
    Developer,
    Message,
    History,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::ApiKey => Focus::Developer,
            Focus::Developer => Focus::Message,
            Focus::Message => Focus::History,
            Focus::History => Focus::ApiKey,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::ApiKey => Focus::History,
            Focus::Developer => Focus::ApiKey,
            Focus::Message => Focus::Developer,
            Focus::History => Focus::Message,
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Editable text with a character-indexed cursor
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub text: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: text.chars().count(),
        }
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// (row, column) of the cursor, counting lines split on '\n'
    pub fn cursor_row_col(&self) -> (usize, usize) {
        let before: String = self.text.chars().take(self.cursor).collect();
        let row = before.matches('\n').count();
        let col = before
            .rsplit('\n')
            .next()
            .map(|line| line.chars().count())
            .unwrap_or(0);
        (row, col)
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: Focus,
    pub notice: Option<String>,

    // Form state
    pub api_key: TextInput,
    pub developer_message: TextInput,
    pub user_message: TextInput,
    pub model: String,

    // Conversation state
    pub conversation: Conversation,
    pub is_loading: bool,
    pub current_response: ResponseBuffer,

    // Rendered markdown: one entry per committed message, plus the live reply
    pub rendered_messages: Vec<Vec<Line<'static>>>,
    pub live_markdown: StreamingMarkdown,

    // Chat view
    pub chat_scroll: u16,
    pub chat_max_scroll: u16,
    pub follow_tail: bool,
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub client: ChatClient,
    pub event_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(settings: &Settings, event_tx: UnboundedSender<AppEvent>) -> Self {
        let focus = if settings.api_key.trim().is_empty() {
            Focus::ApiKey
        } else {
            Focus::Message
        };

        Self {
            should_quit: false,
            focus,
            notice: None,

            api_key: TextInput::with_text(&settings.api_key),
            developer_message: TextInput::with_text(&settings.developer_message),
            user_message: TextInput::default(),
            model: settings.model.clone(),

            conversation: Conversation::new(),
            is_loading: false,
            current_response: ResponseBuffer::new(),
            rendered_messages: Vec::new(),
            live_markdown: StreamingMarkdown::new(),

            chat_scroll: 0,
            chat_max_scroll: 0,
            follow_tail: true,
            chat_area: None,

            animation_frame: 0,

            client: ChatClient::new(&settings.endpoint),
            event_tx,
        }
    }

    /// Whether the send action is currently available
    pub fn can_send(&self) -> bool {
        !self.is_loading && !self.user_message.text.trim().is_empty()
    }

    /// Validate the form and record the user's message.
    ///
    /// Returns the request to send, or `None` when a request is already in
    /// flight or the form is incomplete.
    pub fn begin_submit(&mut self) -> Option<ChatRequest> {
        if self.is_loading {
            return None;
        }

        if self.api_key.text.trim().is_empty() || self.user_message.text.trim().is_empty() {
            self.notice = Some(MISSING_INPUT_NOTICE.to_string());
            return None;
        }

        let user_message = self.user_message.text.clone();
        self.conversation
            .push(ChatMessage::new(ChatRole::User, user_message.clone()));
        self.current_response.clear();
        self.live_markdown.reset();
        self.is_loading = true;
        self.animation_frame = 0;
        self.follow_tail = true;

        info!(chars = user_message.chars().count(), "submitting message");

        Some(ChatRequest {
            developer_message: self.developer_message.text.clone(),
            user_message,
            api_key: self.api_key.text.clone(),
            model: self.model.clone(),
        })
    }

    pub fn append_chunk(&mut self, chunk: &str) {
        if !self.is_loading {
            return;
        }
        self.current_response.push(chunk);
        self.follow_tail = true;
    }

    /// Commit the streamed text as an assistant message
    pub fn finish_stream(&mut self) {
        if !self.is_loading {
            return;
        }
        let full_response = self.current_response.take();
        info!(chars = full_response.chars().count(), "response complete");
        self.conversation
            .push(ChatMessage::new(ChatRole::Assistant, full_response));
        self.user_message.clear();
        self.live_markdown.reset();
        self.is_loading = false;
        self.follow_tail = true;
    }

    /// Abort the in-flight request; the partial response is dropped
    pub fn fail_stream(&mut self, reason: &str) {
        warn!(error = %reason, "chat request failed");
        self.current_response.clear();
        self.live_markdown.reset();
        self.is_loading = false;
        self.notice = Some(REQUEST_FAILED_NOTICE.to_string());
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.chat_max_scroll);
        if self.chat_scroll >= self.chat_max_scroll {
            self.follow_tail = true;
        }
    }

    /// Called by the renderer once it knows how tall the chat content is
    pub fn update_chat_extent(&mut self, content_height: u16, viewport_height: u16) {
        self.chat_max_scroll = content_height.saturating_sub(viewport_height);
        if self.follow_tail || self.chat_scroll > self.chat_max_scroll {
            self.chat_scroll = self.chat_max_scroll;
        }
    }

    pub fn focused_input(&mut self) -> Option<&mut TextInput> {
        match self.focus {
            Focus::ApiKey => Some(&mut self.api_key),
            Focus::Developer => Some(&mut self.developer_message),
            Focus::Message if !self.is_loading => Some(&mut self.user_message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn settings(api_key: &str) -> Settings {
        Settings {
            endpoint: "http://127.0.0.1:8000/api/chat".to_string(),
            model: "gpt-4.1-mini".to_string(),
            developer_message: "You are a helpful AI assistant.".to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn app_with_message(api_key: &str, message: &str) -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(&settings(api_key), tx);
        app.user_message = TextInput::with_text(message);
        app
    }

    #[test]
    fn submit_requires_key_and_message() {
        let mut app = app_with_message("   ", "hello");
        assert!(app.begin_submit().is_none());
        assert_eq!(app.notice.as_deref(), Some(MISSING_INPUT_NOTICE));
        assert!(app.conversation.is_empty());

        let mut app = app_with_message("sk-test", "  \n ");
        assert!(app.begin_submit().is_none());
        assert_eq!(app.notice.as_deref(), Some(MISSING_INPUT_NOTICE));
        assert!(!app.is_loading);
    }

    #[test]
    fn submit_records_message_verbatim_and_builds_request() {
        let mut app = app_with_message("sk-test", "  What is *Rust*?\n");
        let request = app.begin_submit().expect("request");

        assert_eq!(request.user_message, "  What is *Rust*?\n");
        assert_eq!(request.developer_message, "You are a helpful AI assistant.");
        assert_eq!(request.api_key, "sk-test");
        assert_eq!(request.model, "gpt-4.1-mini");

        let last = app.conversation.last().expect("user message");
        assert_eq!(last.role, ChatRole::User);
        assert_eq!(last.content, "  What is *Rust*?\n");
        assert!(app.is_loading);
    }

    #[test]
    fn only_one_request_in_flight() {
        let mut app = app_with_message("sk-test", "first");
        assert!(app.begin_submit().is_some());
        assert!(!app.can_send());
        assert!(app.begin_submit().is_none());
        assert_eq!(app.conversation.len(), 1);
        assert!(app.notice.is_none());
    }

    #[test]
    fn streamed_chunks_are_committed_on_finish() {
        let mut app = app_with_message("sk-test", "hi");
        app.begin_submit().expect("request");

        app.append_chunk("Hello");
        app.append_chunk(", **world**");
        assert_eq!(app.current_response.as_str(), "Hello, **world**");

        app.finish_stream();
        assert!(!app.is_loading);
        assert!(app.current_response.is_empty());
        assert!(app.user_message.text.is_empty());

        let last = app.conversation.last().expect("assistant message");
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Hello, **world**");
        assert_eq!(app.conversation.len(), 2);
    }

    #[test]
    fn failure_discards_partial_response_and_keeps_input() {
        let mut app = app_with_message("sk-bad", "retry me");
        app.begin_submit().expect("request");
        app.append_chunk("half an ans");

        app.fail_stream("HTTP error! status: 401 Unauthorized");

        assert!(!app.is_loading);
        assert!(app.current_response.is_empty());
        assert_eq!(app.user_message.text, "retry me");
        assert_eq!(app.notice.as_deref(), Some(REQUEST_FAILED_NOTICE));
        // Only the user message remains
        assert_eq!(app.conversation.len(), 1);
        assert!(app.can_send());
    }

    #[test]
    fn chunks_after_completion_are_ignored() {
        let mut app = app_with_message("sk-test", "hi");
        app.begin_submit().expect("request");
        app.finish_stream();
        app.append_chunk("late");
        app.finish_stream();
        assert!(app.current_response.is_empty());
        assert_eq!(app.conversation.len(), 2);
    }

    #[test]
    fn text_input_edits_are_utf8_safe() {
        let mut input = TextInput::with_text("héllo");
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.text, "hélo");
        input.home();
        input.insert('¡');
        assert_eq!(input.text, "¡hélo");
        input.delete();
        assert_eq!(input.text, "¡élo");
        input.end();
        input.right();
        assert_eq!(input.cursor, 4);
    }

    #[test]
    fn cursor_row_col_tracks_newlines() {
        let input = TextInput::with_text("ab\ncde");
        assert_eq!(input.cursor_row_col(), (1, 3));
    }

    #[test]
    fn scrolling_up_stops_following_until_bottom() {
        let mut app = app_with_message("sk-test", "");
        app.update_chat_extent(50, 10);
        assert_eq!(app.chat_scroll, 40);

        app.scroll_up(5);
        assert!(!app.follow_tail);
        app.update_chat_extent(60, 10);
        assert_eq!(app.chat_scroll, 35);

        app.scroll_down(100);
        assert!(app.follow_tail);
        assert_eq!(app.chat_scroll, 50);
    }

    #[test]
    fn focus_cycles_through_fields() {
        let focus = Focus::ApiKey;
        assert_eq!(focus.next().next().next().next(), Focus::ApiKey);
        assert_eq!(focus.prev(), Focus::History);
    }
}
