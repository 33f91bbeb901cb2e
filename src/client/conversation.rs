//! Client-side conversation model and its reducers.
//!
//! Every change to a [`Conversation`] goes through a function that takes the
//! previous snapshot and returns the next one. Streaming only ever replaces
//! the last message; user actions (edit, regenerate, delete) truncate from a
//! message and append a new tail.
//!
//! # Examples
//!
//! ```
//! use chat_relay::client::conversation::{Conversation, MessageState, append_turn, apply_event};
//! use chat_relay::relay::event::OutboundEvent;
//!
//! let conv = append_turn(Conversation::new(), "weather in Paris?", Vec::new());
//! let conv = apply_event(conv, &OutboundEvent::status("searching: Paris weather"));
//! let conv = apply_event(conv, &OutboundEvent::content("Sunny."));
//! let conv = apply_event(conv, &OutboundEvent::Done);
//!
//! let reply = conv.messages.last().cloned().unwrap_or_default();
//! assert_eq!(reply.content, "Sunny.");
//! assert_eq!(reply.thinking, None);
//! assert_eq!(reply.state, MessageState::Complete);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::message::Role;
use crate::relay::event::OutboundEvent;
use crate::relay::history::HistoryMessage;

/// Status text of a fresh reply.
pub const THINKING_PLACEHOLDER: &str = "thinking...";
/// Status text of a regenerated reply.
pub const REGENERATE_PLACEHOLDER: &str = "rethinking...";
/// Status text of a reply to an edited message.
pub const EDIT_PLACEHOLDER: &str = "rethinking after edit...";
/// Title of a conversation without user text.
pub const DEFAULT_TITLE: &str = "New chat";

const TITLE_CHARS: usize = 20;

/// Lifecycle of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    /// Still receiving content.
    Streaming,
    /// Finished normally.
    #[default]
    Complete,
    /// Stopped by the user.
    Interrupted,
    /// Ended with an error.
    Failed,
}

/// One message as the client keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Text; grows while streaming.
    pub content: String,
    /// Correlates a tool message with its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Transient status text, cleared once content appears.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Attachment references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Lifecycle state.
    #[serde(default)]
    pub state: MessageState,
}

impl Default for ChatMessage {
    fn default() -> Self {
        Self {
            id: new_id(),
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            thinking: None,
            attachments: Vec::new(),
            state: MessageState::Complete,
        }
    }
}

impl ChatMessage {
    /// A finished user message.
    pub fn user(content: impl Into<String>, attachments: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments,
            ..Self::default()
        }
    }

    /// An empty streaming assistant message showing `thinking`.
    pub fn placeholder(thinking: &str) -> Self {
        Self {
            thinking: Some(thinking.to_owned()),
            state: MessageState::Streaming,
            ..Self::default()
        }
    }

    /// Whether this is an assistant message still receiving events.
    pub fn is_streaming(&self) -> bool {
        self.role == Role::Assistant && self.state == MessageState::Streaming
    }

    /// The shape sent to the relay endpoint.
    pub fn to_history(&self) -> HistoryMessage {
        HistoryMessage {
            id: self.id.clone(),
            role: self.role,
            content: self.content.clone(),
            tool_call_id: self.tool_call_id.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// An ordered conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// An empty conversation titled [`DEFAULT_TITLE`].
    pub fn new() -> Self {
        Self {
            id: new_id(),
            title: DEFAULT_TITLE.to_owned(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The last message, if it is still streaming.
    pub fn streaming_reply(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|m| m.is_streaming())
    }

    /// Position of the message with `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Id of the last assistant message.
    pub fn last_assistant_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id.as_str())
    }

    /// History to send for the reply being generated: every message except a
    /// trailing streaming placeholder.
    pub fn request_history(&self) -> Vec<HistoryMessage> {
        let end = if self.streaming_reply().is_some() {
            self.messages.len() - 1
        } else {
            self.messages.len()
        };
        self.messages[..end].iter().map(ChatMessage::to_history).collect()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn title_from(text: &str) -> String {
    let title: String = text.trim().chars().take(TITLE_CHARS).collect();
    if title.is_empty() {
        DEFAULT_TITLE.to_owned()
    } else {
        title
    }
}

// ── reducers ──────────────────────────────────────────────────

/// Append a user message and a streaming placeholder reply.
///
/// The first user message also names the conversation.
pub fn append_turn(mut conv: Conversation, text: &str, attachments: Vec<String>) -> Conversation {
    if !conv.messages.iter().any(|m| m.role == Role::User) {
        conv.title = title_from(text);
    }
    conv.messages.push(ChatMessage::user(text, attachments));
    conv.messages.push(ChatMessage::placeholder(THINKING_PLACEHOLDER));
    conv
}

/// Apply one decoded event to the reply being streamed.
///
/// Events only touch a streaming last message; once the reply is
/// finalized, further events are no-ops. A turn whose first event arrives
/// after a user message gets its placeholder created on the spot.
pub fn apply_event(mut conv: Conversation, event: &OutboundEvent) -> Conversation {
    if conv.messages.last().is_some_and(|m| m.role == Role::User) {
        conv.messages.push(ChatMessage::placeholder(THINKING_PLACEHOLDER));
    }
    let Some(reply) = conv.messages.last_mut().filter(|m| m.is_streaming()) else {
        return conv;
    };

    match event {
        OutboundEvent::Status { label } => {
            reply.thinking = Some(label.clone());
        }
        OutboundEvent::Content { text } => {
            reply.content.push_str(text);
            if !reply.content.is_empty() {
                reply.thinking = None;
            }
        }
        OutboundEvent::Done => {
            reply.thinking = None;
            reply.state = MessageState::Complete;
        }
        OutboundEvent::Error { message } => {
            reply.content = format!("Error: {message}");
            reply.thinking = None;
            reply.state = MessageState::Failed;
        }
    }
    conv
}

/// Finalize a streaming reply as interrupted, keeping its status text.
pub fn mark_interrupted(mut conv: Conversation) -> Conversation {
    if let Some(reply) = conv.messages.last_mut().filter(|m| m.is_streaming()) {
        reply.state = MessageState::Interrupted;
    }
    conv
}

/// Finalize a streaming reply as failed with a transport-level error.
pub fn mark_failed(mut conv: Conversation, message: &str) -> Conversation {
    if let Some(reply) = conv.messages.last_mut().filter(|m| m.is_streaming()) {
        reply.content = format!("Error: {message}");
        reply.thinking = None;
        reply.state = MessageState::Failed;
    }
    conv
}

/// Remove the message with `id` and everything after it.
///
/// Returns `None` if no such message exists.
pub fn truncate_from(conv: &Conversation, id: &str) -> Option<Conversation> {
    let index = conv.position(id)?;
    let mut next = conv.clone();
    next.messages.truncate(index);
    Some(next)
}

/// Replace the message with `id` by an edited copy, drop everything after
/// it, and append a placeholder reply.
pub fn edit_and_truncate(conv: &Conversation, id: &str, content: &str) -> Option<Conversation> {
    let index = conv.position(id)?;
    let mut next = conv.clone();
    next.messages.truncate(index + 1);
    if let Some(edited) = next.messages.last_mut() {
        edited.content = content.to_owned();
    }
    next.messages.push(ChatMessage::placeholder(EDIT_PLACEHOLDER));
    Some(next)
}

/// Drop the message with `id` and everything after it, then append a
/// placeholder reply. The first message cannot be regenerated.
pub fn regenerate_from(conv: &Conversation, id: &str) -> Option<Conversation> {
    let index = conv.position(id).filter(|i| *i >= 1)?;
    let mut next = conv.clone();
    next.messages.truncate(index);
    next.messages.push(ChatMessage::placeholder(REGENERATE_PLACEHOLDER));
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(conv: &Conversation) -> ChatMessage {
        conv.messages.last().cloned().unwrap_or_default()
    }

    fn answered(question: &str, answer: &str) -> Conversation {
        let conv = append_turn(Conversation::new(), question, Vec::new());
        let conv = apply_event(conv, &OutboundEvent::content(answer));
        apply_event(conv, &OutboundEvent::Done)
    }

    // ── streaming ─────────────────────────────────────────────

    #[test]
    fn append_turn_adds_user_and_placeholder() {
        let conv = append_turn(Conversation::new(), "hello there", Vec::new());
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.title, "hello there");
        let r = reply(&conv);
        assert!(r.is_streaming());
        assert_eq!(r.thinking.as_deref(), Some(THINKING_PLACEHOLDER));
    }

    #[test]
    fn title_is_first_twenty_chars_of_first_question() {
        let conv = append_turn(
            Conversation::new(),
            "what is the weather like in Paris today?",
            Vec::new(),
        );
        assert_eq!(conv.title, "what is the weather ");
        let conv = apply_event(conv, &OutboundEvent::Done);
        let conv = append_turn(conv, "and tomorrow?", Vec::new());
        assert_eq!(conv.title, "what is the weather ");
    }

    #[test]
    fn blank_question_keeps_default_title() {
        let conv = append_turn(Conversation::new(), "   ", Vec::new());
        assert_eq!(conv.title, DEFAULT_TITLE);
    }

    #[test]
    fn status_then_content_clears_thinking() {
        let conv = append_turn(Conversation::new(), "q", Vec::new());
        let conv = apply_event(conv, &OutboundEvent::status("searching: q"));
        assert_eq!(reply(&conv).thinking.as_deref(), Some("searching: q"));
        let conv = apply_event(conv, &OutboundEvent::content(""));
        assert_eq!(reply(&conv).thinking.as_deref(), Some("searching: q"));
        let conv = apply_event(conv, &OutboundEvent::content("Hi"));
        assert_eq!(reply(&conv).thinking, None);
        assert_eq!(reply(&conv).content, "Hi");
    }

    #[test]
    fn first_event_creates_placeholder_after_user_message() {
        let mut conv = Conversation::new();
        conv.messages.push(ChatMessage::user("q", Vec::new()));
        let conv = apply_event(conv, &OutboundEvent::status("searching"));
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(reply(&conv).thinking.as_deref(), Some("searching"));
    }

    #[test]
    fn events_after_done_are_ignored() {
        let conv = answered("q", "answer");
        let before = conv.clone();
        let conv = apply_event(conv, &OutboundEvent::content(" more"));
        let conv = apply_event(conv, &OutboundEvent::status("late"));
        let conv = apply_event(conv, &OutboundEvent::Done);
        assert_eq!(conv, before);
    }

    #[test]
    fn error_replaces_content_and_fails() {
        let conv = append_turn(Conversation::new(), "q", Vec::new());
        let conv = apply_event(conv, &OutboundEvent::content("partial"));
        let conv = apply_event(conv, &OutboundEvent::error("boom"));
        let r = reply(&conv);
        assert_eq!(r.content, "Error: boom");
        assert_eq!(r.state, MessageState::Failed);
        assert_eq!(r.thinking, None);
    }

    #[test]
    fn interrupted_keeps_status_text() {
        let conv = append_turn(Conversation::new(), "q", Vec::new());
        let conv = apply_event(conv, &OutboundEvent::status("searching: q"));
        let conv = mark_interrupted(conv);
        let r = reply(&conv);
        assert_eq!(r.state, MessageState::Interrupted);
        assert_eq!(r.thinking.as_deref(), Some("searching: q"));
        assert!(r.content.is_empty());
        let conv = apply_event(conv, &OutboundEvent::content("late"));
        assert!(reply(&conv).content.is_empty());
    }

    #[test]
    fn mark_failed_only_touches_streaming_reply() {
        let conv = answered("q", "fine");
        let conv = mark_failed(conv, "network down");
        assert_eq!(reply(&conv).content, "fine");
    }

    // ── truncation ────────────────────────────────────────────

    #[test]
    fn truncate_from_removes_message_and_tail() {
        let conv = answered("one", "two");
        let user_id = conv.messages[0].id.clone();
        let next = truncate_from(&conv, &user_id);
        assert!(next.is_some_and(|c| c.messages.is_empty()));
        assert!(truncate_from(&conv, "missing").is_none());
    }

    #[test]
    fn regenerate_replaces_reply() {
        let conv = answered("one", "two");
        let reply_id = conv.messages[1].id.clone();
        let Some(next) = regenerate_from(&conv, &reply_id) else {
            unreachable!("reply should be regenerable");
        };
        assert_eq!(next.messages.len(), 2);
        assert_eq!(next.messages[0].content, "one");
        assert_eq!(reply(&next).thinking.as_deref(), Some(REGENERATE_PLACEHOLDER));
        assert_ne!(reply(&next).id, reply_id);
        assert_eq!(next.request_history().len(), 1);
    }

    #[test]
    fn regenerate_first_message_is_rejected() {
        let conv = answered("one", "two");
        let first = conv.messages[0].id.clone();
        assert!(regenerate_from(&conv, &first).is_none());
    }

    #[test]
    fn edit_rewrites_and_truncates() {
        let conv = answered("one", "two");
        let conv = apply_event(append_turn(conv, "three", Vec::new()), &OutboundEvent::Done);
        let first = conv.messages[0].id.clone();
        let Some(next) = edit_and_truncate(&conv, &first, "uno") else {
            unreachable!("message exists");
        };
        assert_eq!(next.messages.len(), 2);
        assert_eq!(next.messages[0].content, "uno");
        assert_eq!(next.messages[0].id, first);
        assert_eq!(reply(&next).thinking.as_deref(), Some(EDIT_PLACEHOLDER));
    }

    // ── wire shape ────────────────────────────────────────────

    #[test]
    fn request_history_excludes_placeholder() {
        let conv = append_turn(Conversation::new(), "q", Vec::new());
        let history = conv.request_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "q");
    }

    #[test]
    fn message_serializes_camel_case() {
        let mut msg = ChatMessage::user("q", vec!["a.png".into()]);
        msg.tool_call_id = Some("t".into());
        let json = serde_json::to_value(&msg).unwrap_or_default();
        assert_eq!(json["toolCallId"], "t");
        assert_eq!(json["state"], "complete");
        assert_eq!(json["attachments"][0], "a.png");
    }
}
