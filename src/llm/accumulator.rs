//! Tool-call reassembly from streamed fragments.
//!
//! The provider streams a tool call as a run of [`ToolCallFragment`]s that
//! share an `index`. [`ToolCallAccumulator`] merges them per index:
//!
//! - `arguments_delta` values are concatenated in arrival order;
//! - a later non-empty `id` replaces the earlier one;
//! - `name` pieces are appended, except that a piece which already starts
//!   with the accumulated name (a provider re-sending the full name)
//!   replaces it.
//!
//! Fragments for different indices may interleave freely; each index only
//! sees its own fragments in order.
//!
//! # Usage
//!
//! ```
//! use chat_relay::llm::accumulator::ToolCallAccumulator;
//! use chat_relay::llm::delta::ToolCallFragment;
//!
//! let mut acc = ToolCallAccumulator::new();
//! acc.push(ToolCallFragment {
//!     index: 0,
//!     id: Some("x".into()),
//!     name: Some("search".into()),
//!     arguments_delta: Some(r#"{"query":"rust"}"#.into()),
//! });
//! let calls = acc.finish();
//! assert_eq!(calls[0].name, "search");
//! ```

use std::collections::BTreeMap;

use crate::llm::delta::ToolCallFragment;
use crate::llm::error::LlmError;
use crate::llm::message::AssistantToolCall;

/// A tool call with all fragments merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatedToolCall {
    /// The call ID from the provider (empty when it never arrived).
    pub id: String,
    /// The function name (empty when it never arrived).
    pub name: String,
    /// The full JSON arguments string.
    pub arguments: String,
}

/// A tool call whose arguments parsed into a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToolCall {
    /// The call ID from the provider.
    pub id: String,
    /// The function name.
    pub name: String,
    /// Parsed arguments.
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl AccumulatedToolCall {
    /// Validate the merged call and parse its arguments.
    ///
    /// An empty arguments string is treated as `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ToolError`] when the id or name never arrived, or
    /// when the arguments are not a JSON object.
    pub fn resolve(&self) -> Result<ResolvedToolCall, LlmError> {
        if self.name.trim().is_empty() || self.id.trim().is_empty() {
            return Err(LlmError::ToolError(format!(
                "malformed tool call: id={:?} name={:?}",
                self.id, self.name
            )));
        }

        let raw = if self.arguments.trim().is_empty() {
            "{}"
        } else {
            self.arguments.as_str()
        };
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            LlmError::ToolError(format!("invalid arguments for {}: {e}", self.name))
        })?;
        match value {
            serde_json::Value::Object(arguments) => Ok(ResolvedToolCall {
                id: self.id.clone(),
                name: self.name.clone(),
                arguments,
            }),
            other => Err(LlmError::ToolError(format!(
                "arguments for {} must be an object, got {other}",
                self.name
            ))),
        }
    }

    /// The assistant-message form echoed back to the provider.
    pub fn to_assistant_call(&self) -> AssistantToolCall {
        AssistantToolCall::function(&self.id, &self.name, &self.arguments)
    }
}

/// Merge table of in-flight tool calls keyed by fragment index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, AccumulatedToolCall>,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the call at its index.
    pub fn push(&mut self, fragment: ToolCallFragment) {
        let call = self.calls.entry(fragment.index).or_default();

        if let Some(id) = fragment.id
            && !id.is_empty()
        {
            call.id = id;
        }
        if let Some(name) = fragment.name
            && !name.is_empty()
        {
            if name.starts_with(call.name.as_str()) {
                call.name = name;
            } else {
                call.name.push_str(&name);
            }
        }
        if let Some(args) = fragment.arguments_delta {
            call.arguments.push_str(&args);
        }
    }

    /// Merge a batch of fragments in order.
    pub fn extend(&mut self, fragments: impl IntoIterator<Item = ToolCallFragment>) {
        for fragment in fragments {
            self.push(fragment);
        }
    }

    /// Whether no fragment has been seen.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Number of distinct call indices seen.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Consume the table, returning merged calls ordered by index.
    pub fn finish(self) -> Vec<AccumulatedToolCall> {
        self.calls.into_values().collect()
    }
}
