//! Upstream completion client.
//!
//! [`CompletionClient`] is the seam between the relay and the hosted model:
//! it sends one streaming Chat Completions request and hands back the raw
//! response bytes. Parsing those bytes is the multiplexer's job, so test
//! doubles only need to produce canned SSE text.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_relay::llm::client::{
//!     CompletionClient, CompletionRequest, OpenAiCompatClient, OpenAiCompatConfig,
//! };
//! use chat_relay::llm::message::Message;
//!
//! # async fn example() -> Result<(), chat_relay::llm::error::LlmError> {
//! let client = OpenAiCompatClient::new(OpenAiCompatConfig::new("sk-...", "https://api.siliconflow.cn/v1"));
//! let request = CompletionRequest::new("Qwen/Qwen3-8B", vec![Message::user("Hello")]);
//! let _bytes = client.stream(&request).await?;
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::error::LlmError;
use crate::llm::message::Message;

/// A boxed stream of raw response bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// A tool definition offered to the model for function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"search"`).
    pub name: String,
    /// Human-readable description of the tool's purpose.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One streaming completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Full message history, system prompt first.
    pub messages: Vec<Message>,
    /// Tools offered to the model; empty disables tool calling.
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    /// Create a request without tools.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
        }
    }

    /// Offer tools to the model (`tool_choice: auto`).
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Trait for upstream completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Issue a streaming request and return the raw event-stream bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be sent or the provider
    /// answers with a non-2xx status.
    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError>;
}

/// Build the JSON body for the Chat Completions API.
pub fn build_completions_request(request: &CompletionRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": request.messages,
        "stream": true,
    });

    if !request.tools.is_empty()
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("tools".into(), tools_to_openai(&request.tools));
        obj.insert("tool_choice".into(), serde_json::json!("auto"));
    }

    body
}

fn tools_to_openai(tools: &[ToolDefinition]) -> serde_json::Value {
    let arr: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    serde_json::json!(arr)
}

// ── OpenAI-compatible HTTP client ─────────────────────────────

/// Configuration for [`OpenAiCompatClient`].
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Connect timeout. Streaming bodies are not subject to a total timeout.
    pub connect_timeout: Duration,
}

impl OpenAiCompatConfig {
    /// Create a config with the given key and base URL.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Chat Completions client for any OpenAI-compatible provider.
pub struct OpenAiCompatClient {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiCompatClient {
    /// Create a client with the given configuration.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Map an HTTP error status to the appropriate [`LlmError`].
    fn map_http_error(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            code @ (401 | 403) => LlmError::AuthError { status: code, body },
            code => LlmError::ProviderError { status: code, body },
        }
    }
}

fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::TimeoutError(format!("completion request timed out: {e}"))
    } else {
        LlmError::RequestError(format!("completion request failed: {e}"))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError> {
        let body = build_completions_request(request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, body_text));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::StreamError(format!("stream read error: {e}"))));
        Ok(Box::pin(bytes))
    }
}
