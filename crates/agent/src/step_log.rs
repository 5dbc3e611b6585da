//! Per-turn record of thoughts and tool calls, returned with the answer.

use lokal_core::tool::{Observation, ToolArgs};
use serde::{Deserialize, Serialize};

/// One entry in the step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEntry {
    Thought {
        content: String,
    },
    Tool {
        name: String,
        input: serde_json::Value,
        /// Observation text, cut to the log budget
        output: String,
        success: bool,
    },
}

/// Ordered thoughts and tool calls for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    entries: Vec<StepEntry>,
    #[serde(skip)]
    budget: usize,
}

impl StepLog {
    /// `budget` is the number of observation characters kept per entry.
    pub fn new(budget: usize) -> Self {
        Self { entries: Vec::new(), budget }
    }

    pub fn record_thought(&mut self, thought: &str) {
        let thought = thought.trim();
        if !thought.is_empty() {
            self.entries.push(StepEntry::Thought { content: thought.to_string() });
        }
    }

    pub fn record_tool(&mut self, args: &ToolArgs, observation: &Observation) {
        let input = match args {
            ToolArgs::Map(map) => serde_json::Value::Object(map.clone()),
            ToolArgs::Raw(raw) => serde_json::Value::String(raw.clone()),
        };
        self.entries.push(StepEntry::Tool {
            name: observation.tool.clone(),
            input,
            output: truncate_observation(&observation.text, self.budget),
            success: observation.success,
        });
    }

    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    /// Names of the tools called, in order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                StepEntry::Tool { name, .. } => Some(name.as_str()),
                StepEntry::Thought { .. } => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.entries).unwrap_or(serde_json::Value::Null)
    }
}

/// Keep the first `budget` characters, marking the cut with `...`.
pub fn truncate_observation(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
