//! Provider delta parsing.
//!
//! A Chat Completions stream chunk carries either plain text, tool-call
//! fragments, a finish reason, or an in-band error, all encoded through
//! optional fields. [`parse_delta`] resolves that once, at the boundary,
//! into a [`ProviderDelta`] so nothing downstream re-checks field presence.

use serde::Deserialize;

/// A partial tool call as streamed by the provider.
///
/// Fragments for the same call share an `index`; `id` and `name` usually
/// arrive on the first fragment and `arguments_delta` is spread across many.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Position of the call within the assistant message.
    pub index: u32,
    /// Call ID, when this fragment carries one.
    pub id: Option<String>,
    /// Function name (or a piece of it), when present.
    pub name: Option<String>,
    /// Next slice of the JSON arguments string.
    pub arguments_delta: Option<String>,
}

/// One decoded stream chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderDelta {
    /// Non-empty text content.
    Content(String),
    /// One or more tool-call fragments.
    ToolCalls(Vec<ToolCallFragment>),
    /// The choice finished (`stop`, `tool_calls`, `length`, ...).
    Finish(String),
    /// An error object sent inside the stream.
    Error(String),
    /// Role-only or otherwise empty chunk.
    Empty,
}

#[derive(Debug, Deserialize)]
struct ChunkWire {
    #[serde(default)]
    choices: Vec<ChoiceWire>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChoiceWire {
    #[serde(default)]
    delta: Option<DeltaWire>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaWire {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallWire>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallWire {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionWire>,
}

#[derive(Debug, Deserialize)]
struct FunctionWire {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Decode one `data:` payload.
///
/// Only `choices[0]` is considered. Tool-call fragments take precedence
/// over text in the same chunk.
///
/// # Errors
///
/// Returns the JSON error for malformed payloads; callers skip such lines.
pub fn parse_delta(payload: &str) -> Result<ProviderDelta, serde_json::Error> {
    let chunk: ChunkWire = serde_json::from_str(payload)?;

    if let Some(error) = chunk.error {
        return Ok(ProviderDelta::Error(error_message(&error)));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(ProviderDelta::Empty);
    };

    if let Some(delta) = choice.delta {
        if let Some(calls) = delta.tool_calls
            && !calls.is_empty()
        {
            let fragments = calls
                .into_iter()
                .map(|tc| {
                    let (name, arguments_delta) = match tc.function {
                        Some(f) => (f.name, f.arguments),
                        None => (None, None),
                    };
                    ToolCallFragment {
                        index: tc.index.unwrap_or(0),
                        id: tc.id,
                        name,
                        arguments_delta,
                    }
                })
                .collect();
            return Ok(ProviderDelta::ToolCalls(fragments));
        }
        if let Some(text) = delta.content
            && !text.is_empty()
        {
            return Ok(ProviderDelta::Content(text));
        }
    }

    match choice.finish_reason {
        Some(reason) => Ok(ProviderDelta::Finish(reason)),
        None => Ok(ProviderDelta::Empty),
    }
}

/// Error objects arrive as either a bare string or `{"message": ...}`.
fn error_message(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| other.to_string()),
    }
}
