//! Server-side relay: request preparation, the stream multiplexer, and the
//! outbound event encoding.

pub mod event;
pub mod history;
pub mod multiplexer;

pub use event::{OutboundEvent, decode_line};
pub use history::{HistoryMessage, prepare_messages, sanitize_content};
pub use multiplexer::{
    ChatTurnRequest, EventStream, MultiplexerSettings, StreamMultiplexer, TurnOutcome, TurnState,
};
