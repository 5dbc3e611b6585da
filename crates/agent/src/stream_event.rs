//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks and loop progress
//! into events a UI can render while a turn is still running.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent while a turn runs.
///
/// - `chunk`       partial text from the model
/// - `thought`     reasoning for the current step
/// - `tool_call`   the agent is invoking a tool
/// - `tool_result` tool execution completed
/// - `error`       something went wrong; the turn still ends with `done`
/// - `done`        terminal status for the turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Chunk { content: String },

    Thought { content: String },

    ToolCall {
        step: usize,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        step: usize,
        name: String,
        output: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },

    Error { message: String },

    Done {
        conversation_id: String,
        status: String,
        steps: usize,
        tool_calls_made: usize,
    },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}
