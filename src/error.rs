//! Error types for streamchat
//!
//! Library code returns [`ChatError`]; the binary wraps it in `anyhow`.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// The endpoint answered with a non-success status
    #[error("HTTP error! status: {0}")]
    Status(StatusCode),

    /// Connecting, sending, or reading the body failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
