//! Outbound events and their wire encoding.
//!
//! The relay speaks a small SSE dialect that stays compatible with clients
//! written against the provider's own stream:
//!
//! | Event | Wire frame |
//! |---|---|
//! | `Content { text }` | `data: {"choices":[{"delta":{"content":text}}]}` |
//! | `Status { label }` | `event: label` |
//! | `Error { message }` | `data: {"error":message}` |
//! | `Done` | `data: [DONE]` |
//!
//! Every frame is followed by a blank line.
//!
//! # Examples
//!
//! ```
//! use chat_relay::relay::event::{OutboundEvent, decode_line};
//!
//! let frame = OutboundEvent::content("Hi").encode();
//! let first_line = frame.lines().next().unwrap_or_default();
//! assert_eq!(decode_line(first_line), Some(OutboundEvent::content("Hi")));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::delta::{ProviderDelta, parse_delta};
use crate::llm::sse::{DONE_SENTINEL, WireLine, parse_line};

/// One event of the unified outbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// A piece of the answer text.
    Content {
        /// Text to append.
        text: String,
    },
    /// Out-of-band progress label (e.g. `searching: rust`).
    Status {
        /// Opaque, single-line label.
        label: String,
    },
    /// Terminates the turn.
    Done,
    /// A failure explained to the user; always followed by `Done`.
    Error {
        /// Human-readable message.
        message: String,
    },
}

impl OutboundEvent {
    /// Build a content event.
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Build a status event.
    pub fn status(label: impl Into<String>) -> Self {
        Self::Status {
            label: label.into(),
        }
    }

    /// Build an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the turn.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Encode as one wire frame, including the trailing blank line.
    pub fn encode(&self) -> String {
        match self {
            Self::Content { text } => {
                let payload = serde_json::json!({
                    "choices": [{ "delta": { "content": text } }]
                });
                format!("data: {payload}\n\n")
            }
            Self::Status { label } => format!("event: {}\n\n", single_line(label)),
            Self::Error { message } => {
                let payload = serde_json::json!({ "error": message });
                format!("data: {payload}\n\n")
            }
            Self::Done => format!("data: {DONE_SENTINEL}\n\n"),
        }
    }

    /// [`encode`](Self::encode) as bytes for an HTTP body.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode())
    }
}

/// Labels travel on one line; CR/LF inside a label would split the frame.
fn single_line(label: &str) -> String {
    label
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Decode one complete wire line into an event.
///
/// Blank lines, comments, role-only deltas and malformed JSON all yield
/// `None`; malformed lines are logged and otherwise ignored.
pub fn decode_line(line: &str) -> Option<OutboundEvent> {
    match parse_line(line) {
        WireLine::Event(label) => Some(OutboundEvent::Status { label }),
        WireLine::Done => Some(OutboundEvent::Done),
        WireLine::Data(payload) => match parse_delta(&payload) {
            Ok(ProviderDelta::Content(text)) => Some(OutboundEvent::Content { text }),
            Ok(ProviderDelta::Error(message)) => Some(OutboundEvent::Error { message }),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, line, "skipping malformed data line");
                None
            }
        },
        WireLine::Blank | WireLine::Other => None,
    }
}
