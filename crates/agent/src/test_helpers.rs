//! Shared mocks for agent tests.

use async_trait::async_trait;
use lokal_core::error::{ProviderError, ToolError};
use lokal_core::message::Turn;
use lokal_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use lokal_core::tool::{Tool, ToolResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::Summarizer;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next entry. Once the script is used
/// up every further call fails with `NotConfigured`.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())));
        next.map(|content| ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

/// A provider whose replies never arrive.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// A tool returning fixed output and counting its calls.
pub struct StaticTool {
    name: String,
    output: String,
    calls: AtomicUsize,
}

impl StaticTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns canned output"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(
        &self,
        _arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(self.output.clone()))
    }
}

/// Registry-owned wrapper so tests keep a handle on call counts.
pub struct SharedTool(pub std::sync::Arc<StaticTool>);

#[async_trait]
impl Tool for SharedTool {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.0.parameters_schema()
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        self.0.execute(arguments).await
    }
}

/// Summarizer returning fixed text; remembers how many turns it was given.
pub struct StaticSummarizer {
    text: String,
    seen: AtomicUsize,
}

impl StaticSummarizer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.into(),
            seen: AtomicUsize::new(0),
        }
    }

    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        self.seen.store(turns.len(), Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _turns: &[Turn]) -> Result<String, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

pub struct SlowSummarizer(pub Duration);

#[async_trait]
impl Summarizer for SlowSummarizer {
    async fn summarize(&self, _turns: &[Turn]) -> Result<String, ProviderError> {
        tokio::time::sleep(self.0).await;
        Ok("late summary".into())
    }
}
