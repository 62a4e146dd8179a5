pub mod app;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod handler;
pub mod logging;
pub mod markdown;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use client::{ChatClient, ChatRequest};
pub use config::{Config, Overrides, Settings};
pub use decoder::{ResponseBuffer, Utf8Decoder};
pub use error::{ChatError, Result};
pub use markdown::render_markdown;
pub use state::{ChatMessage, ChatRole, Conversation};
