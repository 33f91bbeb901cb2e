//! Request preparation: sanitizing history and fitting it into the context budget.
//!
//! The budget is counted in characters, not tokens. The system prompt always
//! survives; history is kept from the newest message backwards until the next
//! message would overflow. When even the newest message does not fit, its
//! tail is kept behind a truncation marker.

use serde::{Deserialize, Serialize};

use crate::config::ContextConfig;
use crate::llm::message::{Message, Role};

/// One history item as sent by the chat client.
///
/// Unknown fields (`thinking`, `state`, ...) are ignored; attachments are
/// accepted but never forwarded upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    /// Client-side message id.
    #[serde(default)]
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Correlates a tool message with its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Attachment references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl HistoryMessage {
    /// Create a history item without id or attachments.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role,
            content: content.into(),
            tool_call_id: None,
            attachments: Vec::new(),
        }
    }
}

/// Normalize text before it is sent upstream.
///
/// Collapses line-break runs, replaces typographic and full-width
/// punctuation with ASCII, drops control characters other than `\n`, and
/// trims the result.
pub fn sanitize_content(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                while matches!(chars.peek(), Some('\r' | '\n')) {
                    chars.next();
                }
                out.push('\n');
            }
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{2014}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '◆' | '|' => out.push(' '),
            '：' => out.push(':'),
            '（' => out.push('('),
            '）' => out.push(')'),
            '，' => out.push(','),
            '。' => out.push_str(". "),
            '？' => out.push('?'),
            '！' => out.push('!'),
            '；' => out.push(';'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out.replace("&#x27;", "'").trim().to_owned()
}

/// Build the upstream message list for a turn.
///
/// Messages whose content is empty after sanitizing are dropped.
pub fn prepare_messages(
    history: &[HistoryMessage],
    system_prompt: Option<&str>,
    context: &ContextConfig,
) -> Vec<Message> {
    let budget = context.max_chars;
    let system = system_prompt
        .map(sanitize_content)
        .filter(|s| !s.is_empty());
    let mut used = system.as_deref().map_or(0, char_len);

    let sanitized: Vec<(Role, String, Option<String>)> = history
        .iter()
        .map(|m| (m.role, sanitize_content(&m.content), m.tool_call_id.clone()))
        .filter(|(_, content, _)| !content.is_empty())
        .collect();

    let mut kept: Vec<Message> = Vec::new();
    for (position, (role, content, tool_call_id)) in sanitized.iter().enumerate().rev() {
        let len = char_len(content);
        if used + len <= budget {
            kept.push(to_message(*role, content.clone(), tool_call_id.clone()));
            used += len;
            continue;
        }
        if position + 1 == sanitized.len() {
            let available = budget.saturating_sub(used);
            let tail = char_tail(content, available);
            kept.push(to_message(
                *role,
                format!("{}{tail}", context.truncation_marker),
                tool_call_id.clone(),
            ));
        }
        break;
    }
    kept.reverse();

    let mut messages = Vec::with_capacity(kept.len() + 1);
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.extend(kept);
    messages
}

fn to_message(role: Role, content: String, tool_call_id: Option<String>) -> Message {
    match (role, tool_call_id) {
        (Role::Tool, Some(id)) => Message::tool_result(id, content),
        (role, _) => Message::text(role, content),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s`.
fn char_tail(s: &str, n: usize) -> &str {
    let total = char_len(s);
    if n >= total {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((start, _)) => &s[start..],
        None => "",
    }
}
