//! Chat relay: a streaming chat protocol engine.
//!
//! The server side drives an OpenAI-compatible completion stream, reassembles
//! a tool call split across many deltas, runs the tool, issues the follow-up
//! request, and re-multiplexes everything into one event stream with
//! out-of-band status events:
//!
//! Client → `server` → `relay::multiplexer` → `llm::client` → (`tools`) → `llm::client` → event stream
//!
//! The client side decodes that stream incrementally, grows the assistant
//! message, and speaks completed sentences through an ordered, cancellable
//! playback queue. A user abort stops the network read, message growth and
//! audio together.
//!
//! # Architecture
//!
//! - **`llm`**: provider wire parsing, tool-call reassembly, completion client
//! - **`tools`**: tool registry and the built-in search and news tools
//! - **`relay`**: request preparation, stream multiplexer, outbound events
//! - **`server`**: the HTTP endpoint (axum)
//! - **`client`**: decoder, conversation reducers, speech queue, session

pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod relay;
pub mod server;
pub mod tools;

pub use client::{ChatSession, SessionSettings};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use relay::{OutboundEvent, StreamMultiplexer};
pub use server::RelayServer;
