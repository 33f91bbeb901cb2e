//! Core tool types for the relay's tool dispatch.
//!
//! Defines the [`Tool`] trait that all tools implement and
//! [`truncate_output`] for bounding what goes back to the model.

use async_trait::async_trait;

/// JSON object arguments, as parsed from an accumulated tool call.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// Default maximum output size (16 KB).
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024;

/// Truncate a string to at most `max_bytes`, respecting UTF-8 boundaries.
///
/// Returns `(truncated_string, was_truncated)`.
pub fn truncate_output(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    let truncated = &s[..end];
    (
        format!("{truncated}\n\n[output truncated at {max_bytes} bytes]"),
        true,
    )
}

/// Read a required string argument, trimmed. Empty strings count as missing.
pub fn string_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A tool the model may call.
///
/// Tools never fail from the caller's point of view: upstream problems are
/// degraded to a short failure string, which goes back to the model like any
/// other result so it can explain the failure in its answer.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (e.g. "search").
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON Schema for the tool's arguments.
    fn schema(&self) -> serde_json::Value;

    /// Status label announced to the client before the tool runs.
    fn status_label(&self, _args: &ToolArgs) -> String {
        format!("running {}", self.name())
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: &ToolArgs) -> String;
}
