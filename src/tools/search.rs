//! Web search tool backed by a Serper-compatible API.
//!
//! Sends `{"q": query}` with an `X-API-KEY` header and returns the organic
//! result snippets joined by newlines.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::types::{Tool, ToolArgs, string_arg};

const NO_RESULTS: &str = "No results found.";
const FAILED: &str = "Search failed.";

/// Tool that searches the web and returns result snippets.
///
/// # Arguments (JSON)
///
/// - `query` (string, required) - the search query
pub struct SearchTool {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    snippet: Option<String>,
}

impl SearchTool {
    /// Create a search tool for the given endpoint.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        }
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "no search API key configured".to_owned())?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&serde_json::json!({ "q": query }))
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("search API returned {status}"));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response: {e}"))?;

        let snippets: Vec<String> = body.organic.into_iter().filter_map(|r| r.snippet).collect();
        if snippets.is_empty() {
            Ok(NO_RESULTS.to_owned())
        } else {
            Ok(snippets.join("\n"))
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search for information on the web."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query."
                }
            },
            "required": ["query"]
        })
    }

    fn status_label(&self, args: &ToolArgs) -> String {
        match string_arg(args, "query") {
            Some(query) => format!("searching: {query}"),
            None => "searching".to_owned(),
        }
    }

    async fn execute(&self, args: &ToolArgs) -> String {
        let Some(query) = string_arg(args, "query") else {
            warn!("search called without a query");
            return FAILED.to_owned();
        };

        match self.search(query).await {
            Ok(result) => result,
            Err(e) => {
                warn!(query, error = %e, "search failed");
                FAILED.to_owned()
            }
        }
    }
}
