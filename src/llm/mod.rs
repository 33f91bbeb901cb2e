//! Upstream completion provider integration.
//!
//! # Submodules
//!
//! - [`error`]: Error types with stable error codes
//! - [`message`]: Provider-facing message types
//! - [`sse`]: Line-oriented event-stream parsing (shared with the client)
//! - [`delta`]: Tagged provider deltas
//! - [`accumulator`]: Tool-call fragment reassembly
//! - [`client`]: The [`CompletionClient`](client::CompletionClient) seam and its HTTP implementation

pub mod accumulator;
pub mod client;
pub mod delta;
pub mod error;
pub mod message;
pub mod sse;

pub use accumulator::{AccumulatedToolCall, ResolvedToolCall, ToolCallAccumulator};
pub use client::{
    ByteStream, CompletionClient, CompletionRequest, OpenAiCompatClient, OpenAiCompatConfig,
    ToolDefinition,
};
pub use delta::{ProviderDelta, ToolCallFragment, parse_delta};
pub use error::LlmError;
pub use message::{AssistantToolCall, Message, Role};
