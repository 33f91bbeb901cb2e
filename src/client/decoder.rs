//! Incremental decoder for the relay's event stream.

use tracing::debug;

use crate::llm::sse::LineBuffer;
use crate::relay::event::{OutboundEvent, decode_line};

/// Turns arbitrarily split response chunks back into events.
///
/// Nothing is yielded after the first [`OutboundEvent::Done`]; later bytes
/// are dropped.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    lines: LineBuffer,
    finished: bool,
}

impl StreamDecoder {
    /// Create a decoder in its initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<OutboundEvent> {
        if self.finished {
            return Vec::new();
        }
        let lines = self.lines.push(chunk);
        self.decode(lines)
    }

    /// Decode whatever unterminated line remains at end of stream.
    pub fn finish(&mut self) -> Vec<OutboundEvent> {
        if self.finished {
            return Vec::new();
        }
        let lines: Vec<String> = self.lines.flush().into_iter().collect();
        self.decode(lines)
    }

    /// Whether a done event has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode(&mut self, lines: Vec<String>) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        for line in lines {
            let Some(event) = decode_line(&line) else {
                continue;
            };
            let done = event.is_done();
            events.push(event);
            if done {
                self.finished = true;
                self.lines = LineBuffer::new();
                debug!("event stream finished");
                break;
            }
        }
        events
    }
}
