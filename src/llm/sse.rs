//! Line-oriented event-stream parsing.
//!
//! Both the upstream provider stream and the relay's own outbound stream are
//! SSE-shaped, one field per line:
//!
//! ```text
//! event: searching
//!
//! data: {"choices":[{"delta":{"content":"Hi"}}]}
//!
//! data: [DONE]
//! ```
//!
//! A single JSON payload never spans multiple `data:` lines, so every line
//! is interpreted on its own. [`LineBuffer`] reassembles lines from chunks
//! with arbitrary boundaries (including mid-character), and [`parse_line`]
//! classifies each complete line.
//!
//! # Examples
//!
//! ```
//! use chat_relay::llm::sse::{LineBuffer, WireLine, parse_line};
//!
//! let mut buf = LineBuffer::new();
//! assert!(buf.push(b"data: hel").is_empty());
//! let lines = buf.push(b"lo\n\n");
//! assert_eq!(parse_line(&lines[0]), WireLine::Data("hello".into()));
//! assert_eq!(parse_line(&lines[1]), WireLine::Blank);
//! ```

/// Payload of the terminating data line.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classification of a single complete wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireLine {
    /// `event: <label>`.
    Event(String),
    /// `data: <payload>` with any payload other than the sentinel.
    Data(String),
    /// `data: [DONE]`.
    Done,
    /// Empty line (frame separator).
    Blank,
    /// Comment lines, `id:`/`retry:` fields and anything unrecognised.
    Other,
}

/// Parse a line into (field, value). The value has one leading space stripped.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon_pos = line.find(':')?;
    let field = &line[..colon_pos];
    let value = &line[colon_pos + 1..];
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

/// Classify one complete line (without its trailing newline).
pub fn parse_line(line: &str) -> WireLine {
    if line.is_empty() {
        return WireLine::Blank;
    }
    if line.starts_with(':') {
        return WireLine::Other;
    }
    match parse_field(line) {
        Some(("data", value)) if value.trim() == DONE_SENTINEL => WireLine::Done,
        Some(("data", value)) => WireLine::Data(value.to_string()),
        Some(("event", value)) => WireLine::Event(value.to_string()),
        _ => WireLine::Other,
    }
}

/// Reassembles complete lines from a byte stream.
///
/// Bytes are buffered rather than decoded per chunk, so a multi-byte
/// character split across two reads is decoded intact once its line
/// completes. A trailing `\r` is stripped from every line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Return the unterminated trailing line, if any, and reset.
    ///
    /// Call this when the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
