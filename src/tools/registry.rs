//! Tool registry and dispatch.
//!
//! The [`ToolRegistry`] holds registered tools, exports their definitions
//! for the completion request, and dispatches accumulated calls by name.
//! Dispatch never fails: an unknown name yields a structured result string
//! so the turn can still complete with a visible explanation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::ToolsConfig;
use crate::llm::client::ToolDefinition;

use super::news::DailyNewsTool;
use super::search::SearchTool;
use super::types::{Tool, ToolArgs, truncate_output};

/// Registry of tools offered to the model.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    max_result_bytes: usize,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: super::types::DEFAULT_MAX_BYTES,
        }
    }

    /// Registry with the built-in `search` and `get_daily_news` tools.
    pub fn from_config(config: &ToolsConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut registry = Self::new().with_max_result_bytes(config.max_result_bytes);
        registry.register(Arc::new(SearchTool::new(
            &config.serper_url,
            config.serper_api_key.clone(),
            timeout,
        )));
        registry.register(Arc::new(DailyNewsTool::new(&config.news_url, timeout)));
        registry
    }

    /// Bound every dispatched result to `max_bytes`.
    pub fn with_max_result_bytes(mut self, max_bytes: usize) -> Self {
        self.max_result_bytes = max_bytes;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Status label to announce before running `name`.
    pub fn status_label(&self, name: &str, args: &ToolArgs) -> String {
        match self.tools.get(name) {
            Some(tool) => tool.status_label(args),
            None => format!("running {name}"),
        }
    }

    /// Run the named tool and return its (bounded) result.
    pub async fn dispatch(&self, name: &str, args: &ToolArgs) -> String {
        let Some(tool) = self.get(name) else {
            info!(tool = name, "model requested an unknown tool");
            return unknown_tool_result(name);
        };

        debug!(tool = name, "dispatching tool call");
        let output = tool.execute(args).await;
        let (bounded, truncated) = truncate_output(&output, self.max_result_bytes);
        if truncated {
            debug!(tool = name, bytes = output.len(), "tool output truncated");
        }
        bounded
    }
}

fn unknown_tool_result(name: &str) -> String {
    serde_json::json!({ "error": format!("Unknown tool: {name}") }).to_string()
}
