//! Stream multiplexer: one upstream turn (plus an optional tool round trip)
//! re-emitted as a single [`OutboundEvent`] stream.
//!
//! ```text
//! request ──▶ upstream #1 ──▶ content? ──────────────────────────▶ content… done
//!                         └─▶ tool-call fragments ─▶ accumulate
//!                                   ▼
//!                       status ─▶ dispatch ─▶ upstream #2 (no tools) ─▶ content… done
//! ```
//!
//! Every path ends in exactly one `Done`. Failures after the first request
//! has been accepted become an `Error` event followed by `Done`; they never
//! surface as a transport failure.
//!
//! Per-turn buffering lives in [`TurnState`], which is pure and can be
//! driven from byte slices in tests.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ContextConfig;
use crate::llm::accumulator::{AccumulatedToolCall, ResolvedToolCall, ToolCallAccumulator};
use crate::llm::client::{ByteStream, CompletionClient, CompletionRequest};
use crate::llm::delta::{ProviderDelta, parse_delta};
use crate::llm::error::LlmError;
use crate::llm::message::Message;
use crate::llm::sse::{LineBuffer, WireLine, parse_line};
use crate::relay::event::OutboundEvent;
use crate::relay::history::{HistoryMessage, prepare_messages};
use crate::tools::ToolRegistry;

/// A boxed stream of outbound events.
pub type EventStream = Pin<Box<dyn Stream<Item = OutboundEvent> + Send>>;

/// One chat turn as requested by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    /// Conversation so far, oldest first, ending with the new user message.
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    /// Optional system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Model to use; empty selects the configured default.
    #[serde(default)]
    pub model_id: String,
    /// Offer tools to the model.
    #[serde(default, alias = "useSearch")]
    pub use_tools: bool,
}

/// Settings shared by every turn.
#[derive(Debug, Clone)]
pub struct MultiplexerSettings {
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Context budget.
    pub context: ContextConfig,
}

impl Default for MultiplexerSettings {
    fn default() -> Self {
        Self {
            default_model: "Qwen/Qwen3-8B".to_owned(),
            context: ContextConfig::default(),
        }
    }
}

// ── TurnState ─────────────────────────────────────────────────

/// How an upstream response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Plain answer; all content has already been emitted.
    Answered,
    /// The model asked for tools; merged calls ordered by index.
    ToolCalls(Vec<AccumulatedToolCall>),
    /// The provider reported an error inside the stream.
    Failed(String),
}

/// Buffering state for one upstream response.
///
/// Content is passed through immediately until the first tool-call fragment
/// arrives; from then on content is suppressed and fragments are merged.
#[derive(Debug, Default)]
pub struct TurnState {
    lines: LineBuffer,
    calls: ToolCallAccumulator,
    upstream_done: bool,
    failure: Option<String>,
}

impl TurnState {
    /// Create state for a fresh response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns content events to emit right away.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<OutboundEvent> {
        let lines = self.lines.push(chunk);
        lines
            .iter()
            .filter_map(|line| self.apply_line(line))
            .collect()
    }

    /// Process a trailing unterminated line at end of input.
    pub fn end(&mut self) -> Vec<OutboundEvent> {
        match self.lines.flush() {
            Some(line) => self.apply_line(&line).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Whether `[DONE]` or an in-band error has been seen.
    pub fn is_finished(&self) -> bool {
        self.upstream_done || self.failure.is_some()
    }

    /// Whether a tool-call fragment has been seen.
    pub fn in_tool_call(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Consume the state and classify the response.
    pub fn into_outcome(self) -> TurnOutcome {
        if let Some(message) = self.failure {
            return TurnOutcome::Failed(message);
        }
        if self.calls.is_empty() {
            TurnOutcome::Answered
        } else {
            TurnOutcome::ToolCalls(self.calls.finish())
        }
    }

    fn apply_line(&mut self, line: &str) -> Option<OutboundEvent> {
        if self.is_finished() {
            return None;
        }
        match parse_line(line) {
            WireLine::Done => {
                self.upstream_done = true;
                None
            }
            WireLine::Data(payload) => self.apply_payload(&payload),
            WireLine::Event(_) | WireLine::Blank | WireLine::Other => None,
        }
    }

    fn apply_payload(&mut self, payload: &str) -> Option<OutboundEvent> {
        match parse_delta(payload) {
            Ok(ProviderDelta::Content(text)) if !self.in_tool_call() => {
                Some(OutboundEvent::Content { text })
            }
            Ok(ProviderDelta::ToolCalls(fragments)) => {
                self.calls.extend(fragments);
                None
            }
            Ok(ProviderDelta::Error(message)) => {
                self.failure = Some(message);
                None
            }
            Ok(ProviderDelta::Content(_) | ProviderDelta::Finish(_) | ProviderDelta::Empty) => None,
            Err(e) => {
                debug!(error = %e, "skipping malformed upstream line");
                None
            }
        }
    }
}

// ── StreamMultiplexer ─────────────────────────────────────────

/// Drives upstream requests and tool dispatch for chat turns.
#[derive(Clone)]
pub struct StreamMultiplexer {
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    settings: MultiplexerSettings,
}

impl std::fmt::Debug for StreamMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMultiplexer")
            .field("client", &self.client.name())
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .finish()
    }
}

impl StreamMultiplexer {
    /// Create a multiplexer.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        settings: MultiplexerSettings,
    ) -> Self {
        Self {
            client,
            tools,
            settings,
        }
    }

    /// The first upstream request for a turn.
    pub fn build_request(&self, turn: &ChatTurnRequest) -> CompletionRequest {
        let model = if turn.model_id.trim().is_empty() {
            self.settings.default_model.clone()
        } else {
            turn.model_id.clone()
        };
        let messages = prepare_messages(
            &turn.messages,
            turn.system_prompt.as_deref(),
            &self.settings.context,
        );
        let request = CompletionRequest::new(model, messages);
        if turn.use_tools && !self.tools.is_empty() {
            request.with_tools(self.tools.definitions())
        } else {
            request
        }
    }

    /// Issue the first upstream request and return the event stream.
    ///
    /// # Errors
    ///
    /// Returns the client's error when the first request fails outright, so
    /// the caller can answer with a non-2xx status instead of a stream.
    pub async fn open(&self, turn: &ChatTurnRequest) -> Result<EventStream, LlmError> {
        let request = self.build_request(turn);
        info!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "starting chat turn"
        );
        let bytes = self.client.stream(&request).await?;
        Ok(self.clone().drive(request, bytes, true))
    }

    /// Like [`open`](Self::open), but a failed first request becomes an
    /// `Error` + `Done` pair inside the stream.
    pub fn run(&self, turn: ChatTurnRequest) -> EventStream {
        let this = self.clone();
        Box::pin(stream! {
            match this.open(&turn).await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "upstream request failed");
                    yield OutboundEvent::error(e.to_string());
                    yield OutboundEvent::Done;
                }
            }
        })
    }

    /// Re-emit one upstream response, then either finish or run the tool
    /// branch and splice in the follow-up response.
    fn drive(self, request: CompletionRequest, bytes: ByteStream, allow_tools: bool) -> EventStream {
        Box::pin(stream! {
            let mut bytes = bytes;
            let mut turn = TurnState::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for event in turn.feed(&chunk) {
                            yield event;
                        }
                        if turn.is_finished() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "upstream stream broke off");
                        yield OutboundEvent::error(e.to_string());
                        yield OutboundEvent::Done;
                        return;
                    }
                }
            }
            for event in turn.end() {
                yield event;
            }

            let calls = match turn.into_outcome() {
                TurnOutcome::Answered => {
                    yield OutboundEvent::Done;
                    return;
                }
                TurnOutcome::Failed(message) => {
                    warn!(error = %message, "provider reported an error in the stream");
                    yield OutboundEvent::error(message);
                    yield OutboundEvent::Done;
                    return;
                }
                TurnOutcome::ToolCalls(calls) => calls,
            };

            if !allow_tools {
                warn!(calls = calls.len(), "tool call requested during follow-up turn");
                yield OutboundEvent::error("the model requested a tool while answering with tool results");
                yield OutboundEvent::Done;
                return;
            }

            if calls.len() > 1 {
                info!(requested = calls.len(), "multiple tool calls requested; running one");
                yield OutboundEvent::status(format!(
                    "only one tool call runs per turn ({} requested)",
                    calls.len()
                ));
            }

            let (call, resolved) = match select_call(&calls) {
                Ok(selected) => selected,
                Err(e) => {
                    warn!(error = %e, "malformed tool call");
                    yield OutboundEvent::error(format!("tool call failed: {}", e.message()));
                    yield OutboundEvent::Done;
                    return;
                }
            };

            yield OutboundEvent::status(self.tools.status_label(&resolved.name, &resolved.arguments));
            info!(tool = %resolved.name, call_id = %resolved.id, "running tool");
            let result = self.tools.dispatch(&resolved.name, &resolved.arguments).await;

            let mut messages = request.messages;
            messages.push(Message::assistant_tool_calls(vec![call.to_assistant_call()]));
            messages.push(Message::tool_result(
                resolved.id.as_str(),
                serde_json::Value::String(result).to_string(),
            ));
            let follow_up = CompletionRequest::new(request.model, messages);

            debug!(messages = follow_up.messages.len(), "sending follow-up request");
            match self.client.stream(&follow_up).await {
                Ok(bytes) => {
                    let mut events = self.clone().drive(follow_up, bytes, false);
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "follow-up request failed");
                    yield OutboundEvent::error(e.to_string());
                    yield OutboundEvent::Done;
                }
            }
        })
    }
}

/// The first call that resolves wins; if none does, the first call's error.
fn select_call(
    calls: &[AccumulatedToolCall],
) -> Result<(&AccumulatedToolCall, ResolvedToolCall), LlmError> {
    let mut first_error = None;
    for call in calls {
        match call.resolve() {
            Ok(resolved) => return Ok((call, resolved)),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| LlmError::ToolError("no tool call to run".into())))
}
