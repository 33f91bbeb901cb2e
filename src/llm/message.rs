//! Provider-facing message types.
//!
//! These are the messages the relay sends upstream. They serialize directly
//! into the OpenAI-compatible `messages` array shape, so the request builder
//! does not need a second conversion pass.
//!
//! # Examples
//!
//! ```
//! use chat_relay::llm::message::{Message, Role};
//!
//! let user_msg = Message::user("What is Rust?");
//! assert_eq!(user_msg.role, Role::User);
//!
//! let tool_result = Message::tool_result("call_123", "search results");
//! assert_eq!(tool_result.role, Role::Tool);
//! assert_eq!(tool_result.tool_call_id.as_deref(), Some("call_123"));
//! ```

use serde::{Deserialize, Serialize};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
    /// Tool execution result.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Function part of an assistant tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// The function name being called.
    pub name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

/// An assistant tool call, in the shape the provider expects it echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Function name and arguments.
    pub function: FunctionCall,
}

impl AssistantToolCall {
    /// Create a function tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A message in the upstream conversation.
///
/// `content` is `None` only for an assistant message that carries tool calls,
/// which serializes as `"content": null` like the provider emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,
    /// Text content.
    pub content: Option<String>,
    /// Tool calls made by the assistant (assistant role only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<AssistantToolCall>,
    /// Correlates a tool result with the call that produced it (tool role only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a text message with the given role.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Create the assistant message that requested tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<AssistantToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Text content, or `""` for a tool-call-only assistant message.
    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn user_message_serializes_without_tool_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn assistant_tool_call_message_has_null_content() {
        let msg = Message::assistant_tool_calls(vec![AssistantToolCall::function(
            "call_1",
            "search",
            r#"{"query":"rust"}"#,
        )]);
        let json = serde_json::to_value(&msg).unwrap_or_default();
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["id"], "call_1");
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(msg.text_content(), "");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let json = serde_json::to_value(Message::tool_result("call_9", "\"ok\"")).unwrap_or_default();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
        assert_eq!(json["content"], "\"ok\"");
    }
}
