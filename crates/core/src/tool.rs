//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! search the web, run code, load and write files, etc. The agent loop
//! consumes every tool through one uniform contract and always gets an
//! [`Observation`] back, never a hard failure.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use crate::error::ToolError;

/// Marker some tools append to signal a side artifact (e.g. a plot).
pub const IMAGE_MARKER: &str = "[IMAGE_GENERATED]:";

/// Key used when raw string arguments have to be passed to a tool.
pub const DEFAULT_ARG_KEY: &str = "query";

/// Arguments for a tool call, as the model produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArgs {
    /// Structured key/value payload
    Map(serde_json::Map<String, serde_json::Value>),
    /// Free text (ReAct `Action Input:` lines, malformed JSON, ...)
    Raw(String),
}

impl ToolArgs {
    /// Convert into the key/value shape every tool accepts.
    ///
    /// A raw string that looks bracket-delimited is parsed as a JSON object;
    /// anything else is passed under [`DEFAULT_ARG_KEY`].
    pub fn adapt(self) -> serde_json::Map<String, serde_json::Value> {
        match self {
            ToolArgs::Map(map) => map,
            ToolArgs::Raw(raw) => {
                let trimmed = raw.trim();
                if trimmed.contains('{') && trimmed.contains('}') {
                    let start = trimmed.find('{').unwrap_or(0);
                    let end = trimmed.rfind('}').map(|i| i + 1).unwrap_or(trimmed.len());
                    if start < end {
                        if let Ok(serde_json::Value::Object(map)) =
                            serde_json::from_str::<serde_json::Value>(&trimmed[start..end])
                        {
                            return map;
                        }
                    }
                }
                let mut map = serde_json::Map::new();
                map.insert(DEFAULT_ARG_KEY.into(), serde_json::Value::String(trimmed.to_string()));
                map
            }
        }
    }

    /// Render for logs and the step log.
    pub fn display(&self) -> String {
        match self {
            ToolArgs::Map(map) => serde_json::Value::Object(map.clone()).to_string(),
            ToolArgs::Raw(raw) => raw.clone(),
        }
    }
}

impl From<serde_json::Value> for ToolArgs {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => ToolArgs::Map(map),
            serde_json::Value::String(s) => ToolArgs::Raw(s),
            serde_json::Value::Null => ToolArgs::Map(serde_json::Map::new()),
            other => ToolArgs::Raw(other.to_string()),
        }
    }
}

impl From<&str> for ToolArgs {
    fn from(raw: &str) -> Self {
        ToolArgs::Raw(raw.to_string())
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), data: None }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into(), data: None }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// What the model sees after a tool step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// The tool that was asked for
    pub tool: String,
    /// Text fed back to the model
    pub text: String,
    /// Whether the tool ran and reported success
    pub success: bool,
}

impl Observation {
    pub fn from_result(tool: &str, result: ToolResult) -> Self {
        Self { tool: tool.to_string(), text: result.output, success: result.success }
    }

    pub fn from_error(tool: &str, err: &ToolError) -> Self {
        Self { tool: tool.to_string(), text: format!("Error: {err}"), success: false }
    }
}

/// Split tool output into narrative text and an artifact path.
///
/// `"plot done\n[IMAGE_GENERATED]: artifacts/a.png"` yields
/// `("plot done", Some("artifacts/a.png"))`.
pub fn split_artifact(text: &str) -> (String, Option<String>) {
    match text.split_once(IMAGE_MARKER) {
        Some((narrative, rest)) => {
            let path = rest.trim();
            let path = path.lines().next().unwrap_or("").trim();
            let path = (!path.is_empty()).then(|| path.to_string());
            (narrative.trim_end().to_string(), path)
        }
        None => (text.to_string(), None),
    }
}

/// A tool definition shown to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The core Tool trait.
///
/// Each built-in tool (web_search, python_exec, file_loader, ...) implements
/// this trait. Tools are registered in the ToolRegistry and made available
/// to the agent loop. A tool with mutable state synchronizes it internally;
/// callers may run it from many conversations at once.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for the system prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Read-mostly after startup: the agent loop only ever takes `&self`, so
/// one registry can be shared behind an `Arc` by every conversation.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool.
    ///
    /// Name collisions are resolved last-wins: the new tool replaces the old
    /// one silently. Configuration layers rely on this to override a built-in.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool, reporting every failure as a typed error.
    ///
    /// When `allowed` is given, names outside it are refused before lookup.
    /// Timeouts and panics inside the tool surface as errors too.
    pub async fn run(
        &self,
        name: &str,
        args: ToolArgs,
        allowed: Option<&HashSet<String>>,
    ) -> std::result::Result<ToolResult, ToolError> {
        if let Some(allowed) = allowed {
            if !allowed.contains(name) {
                return Err(ToolError::NotAllowed(name.to_string()));
            }
        }
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let call = AssertUnwindSafe(tool.execute(args.adapt())).catch_unwind();
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: "tool panicked".into(),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Execute a tool and always come back with an observation.
    pub async fn execute(
        &self,
        name: &str,
        args: ToolArgs,
        allowed: Option<&HashSet<String>>,
    ) -> Observation {
        match self.run(name, args, allowed).await {
            Ok(result) => Observation::from_result(name, result),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool execution failed");
                Observation::from_error(name, &e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
