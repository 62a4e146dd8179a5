//! Incremental decoding of a streamed response body

use std::str;

const REPLACEMENT: char = '\u{FFFD}';

/// Streaming UTF-8 decoder.
///
/// A multi-byte character split across two network chunks is held back until
/// the rest of it arrives, so the concatenated output always equals decoding
/// the whole body in one go.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any carried-over bytes) as possible
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut pos = 0;

        while pos < self.pending.len() {
            match str::from_utf8(&self.pending[pos..]) {
                Ok(text) => {
                    out.push_str(text);
                    pos = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[pos..pos + valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(REPLACEMENT);
                            pos += valid + invalid;
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            pos += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..pos);
        out
    }

    /// Flush the decoder at end of stream
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Partially-streamed assistant text, committed once the stream closes
#[derive(Debug, Default, Clone)]
pub struct ResponseBuffer {
    text: String,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_chunks_pass_through() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"Hello, "), "Hello, ");
        assert_eq!(decoder.decode(b"world"), "world");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        // "héllo 🦀" with the é and the crab split mid-sequence
        let bytes = "héllo 🦀".as_bytes();
        let mut decoder = Utf8Decoder::new();

        let first = decoder.decode(&bytes[..2]);
        assert_eq!(first, "h");
        assert!(decoder.has_pending());

        let second = decoder.decode(&bytes[2..8]);
        let third = decoder.decode(&bytes[8..]);
        assert_eq!(format!("{first}{second}{third}"), "héllo 🦀");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn byte_at_a_time_matches_whole_body() {
        let body = "| a | b |\n|---|---|\n| ü | 漢字 |\n```rust\nfn main() {}\n```";
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in body.as_bytes() {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, body);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xFFok"), "ok\u{FFFD}ok");
    }

    #[test]
    fn truncated_tail_is_flushed_on_finish() {
        let mut decoder = Utf8Decoder::new();
        let crab = "🦀".as_bytes();
        assert_eq!(decoder.decode(&crab[..3]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn response_buffer_take_clears() {
        let mut buffer = ResponseBuffer::new();
        buffer.push("partial ");
        buffer.push("answer");
        assert_eq!(buffer.as_str(), "partial answer");
        assert_eq!(buffer.take(), "partial answer");
        assert!(buffer.is_empty());
    }
}
