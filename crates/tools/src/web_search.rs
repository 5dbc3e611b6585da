//! Web search tool backed by the Brave Search API.
//!
//! Needs `WEB_SEARCH_API_KEY` (or `tools.search_api_key`). Calls are spaced
//! at least one second apart, the free-tier limit.

use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{Tool, ToolResult};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_RESULTS: u64 = 5;
const MAX_RESULTS: u64 = 10;

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            limiter: RateLimiter::new(Duration::from_secs(1)),
        }
    }
}

/// Enforces a minimum interval between calls.
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    /// Wait until a call is allowed, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.interval {
                tokio::time::sleep(self.interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct SearchResult {
    title: String,
    link: String,
    snippet: String,
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn requested_count(arguments: &serde_json::Map<String, serde_json::Value>) -> u64 {
    let raw = match arguments.get("num_results") {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_RESULTS),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_RESULTS),
        _ => DEFAULT_RESULTS,
    };
    raw.clamp(1, MAX_RESULTS)
}

fn extract_results(payload: &serde_json::Value) -> Vec<SearchResult> {
    payload["web"]["results"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| SearchResult {
                    title: item["title"].as_str().unwrap_or_default().to_string(),
                    link: item["url"].as_str().unwrap_or_default().to_string(),
                    snippet: item["description"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No web results for '{query}'.");
    }
    let mut out = format!("Web results for '{query}':\n");
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n   {}\n   {}\n", i + 1, r.title, r.link, r.snippet));
    }
    out.trim_end().to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for real-time information. Returns titles, links and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (1-10, default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let query = normalize_query(arguments.get("query").and_then(|v| v.as_str()).unwrap_or(""));
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("Query is empty".into()));
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: "WEB_SEARCH_API_KEY missing; set a Brave Search API key".into(),
        })?;

        let count = requested_count(&arguments);
        self.limiter.acquire().await;

        debug!(query = %query, count, "Searching the web");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("count", &count.to_string())])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("search API returned {status}"),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: format!("invalid response: {e}"),
        })?;

        let mut results = extract_results(&payload);
        results.truncate(count as usize);

        Ok(ToolResult::ok(format_results(&query, &results)).with_data(serde_json::json!({
            "query": query,
            "count": results.len(),
            "results": results,
        })))
    }
}
