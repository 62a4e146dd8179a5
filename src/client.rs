use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decoder::Utf8Decoder;
use crate::error::{ChatError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/api/chat";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// JSON body posted to the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub developer_message: String,
    pub user_message: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
}

impl ChatClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post `request` and read the reply body as it streams in.
    ///
    /// Every decoded chunk is handed to `on_chunk` as soon as it arrives. The
    /// full text is returned once the server closes the stream.
    pub async fn stream_chat<F>(&self, request: &ChatRequest, mut on_chunk: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        info!(endpoint = %self.endpoint, model = %request.model, "sending chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "chat endpoint returned an error status");
            return Err(ChatError::Status(status));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = Utf8Decoder::new();
        let mut full_response = String::new();
        let mut chunks = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            chunks += 1;
            let text = decoder.decode(&bytes);
            if !text.is_empty() {
                full_response.push_str(&text);
                on_chunk(&text);
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            full_response.push_str(&tail);
            on_chunk(&tail);
        }

        debug!(chunks, bytes = full_response.len(), "chat stream closed");
        Ok(full_response)
    }
}
