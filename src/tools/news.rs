//! Daily trending news per platform.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::types::{Tool, ToolArgs, string_arg};

const NO_NEWS: &str = "No news found.";
const FAILED: &str = "Failed to fetch daily news.";

/// Tool that lists trending headlines for a platform (`baidu`, `weibo`,
/// `zhihu`, `github`, ...).
///
/// # Arguments (JSON)
///
/// - `platform` (string, required) - platform code
pub struct DailyNewsTool {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    status: serde_json::Value,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

impl NewsResponse {
    /// The API reports success as `"200"`; accept a bare number too.
    fn is_ok(&self) -> bool {
        match &self.status {
            serde_json::Value::String(s) => s == "200",
            serde_json::Value::Number(n) => n.as_u64() == Some(200),
            _ => false,
        }
    }
}

enum NewsFailure {
    Status(u16),
    Other(String),
}

impl DailyNewsTool {
    /// Create a news tool for the given endpoint.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn fetch(&self, platform: &str) -> Result<String, NewsFailure> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("platform", platform)])
            .send()
            .await
            .map_err(|e| NewsFailure::Other(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsFailure::Status(status.as_u16()));
        }

        let body: NewsResponse = response
            .json()
            .await
            .map_err(|e| NewsFailure::Other(format!("invalid response: {e}")))?;
        if !body.is_ok() {
            return Err(NewsFailure::Other(format!(
                "news API error: {}",
                body.msg.unwrap_or_default()
            )));
        }

        let lines: Vec<String> = body
            .data
            .iter()
            .map(|item| format!("Title: {}, Link: {}", item.title, item.url))
            .collect();
        if lines.is_empty() {
            Ok(NO_NEWS.to_owned())
        } else {
            Ok(lines.join("\n"))
        }
    }
}

#[async_trait]
impl Tool for DailyNewsTool {
    fn name(&self) -> &str {
        "get_daily_news"
    }

    fn description(&self) -> &str {
        "Get trending news headlines for a platform."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "platform": {
                    "type": "string",
                    "description": "Platform code, e.g. baidu, weibo, zhihu, github."
                }
            },
            "required": ["platform"]
        })
    }

    fn status_label(&self, args: &ToolArgs) -> String {
        match string_arg(args, "platform") {
            Some(platform) => format!("fetching news: {platform}"),
            None => "fetching news".to_owned(),
        }
    }

    async fn execute(&self, args: &ToolArgs) -> String {
        let Some(platform) = string_arg(args, "platform") else {
            warn!("get_daily_news called without a platform");
            return FAILED.to_owned();
        };

        match self.fetch(platform).await {
            Ok(news) => news,
            Err(NewsFailure::Status(status)) => {
                warn!(platform, status, "news API returned an error status");
                format!("Error: Failed to fetch daily news. Status: {status}")
            }
            Err(NewsFailure::Other(e)) => {
                warn!(platform, error = %e, "failed to fetch daily news");
                FAILED.to_owned()
            }
        }
    }
}
