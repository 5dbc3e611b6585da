//! Decision parsing: turn unreliable model text into a [`Decision`].
//!
//! Two reply contracts are supported:
//!
//! - **JSON**: an object with `thought`, `tool_name`, `tool_args` and
//!   `final_answer`. Models wrap it in fences, prefix it with prose or skip
//!   it and write code, so [`parse_structured`] runs an ordered chain of
//!   [`ParseStrategy`] attempts and the first success wins.
//! - **ReAct text**: `Thought: / Action: / Action Input:` or
//!   `Final Answer:`, handled by [`parse_react`], which always yields a
//!   decision.

use lokal_core::tool::ToolArgs;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::trace;

/// Fenced code must be longer than this to be auto-wrapped as a tool call.
pub const MIN_CODE_CHARS: usize = 20;

const CODE_MARKERS: &[&str] = &["import", "print", "plt.", "pd."];

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:json)?[ \t]*\r?\n?\s*(\{.*?\})\s*```").expect("static regex")
});
static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("static regex")
});
static REACT_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)Action:[ \t]*([^\n]+?)[ \t]*\r?\n[ \t]*Action Input:[ \t]*(.+?)\s*(?:\n[ \t]*\n|Observation|\z)",
    )
    .expect("static regex")
});

/// What the model decided to do in one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Final { content: String, thought: String },
    Tool { tool: String, args: ToolArgs, thought: String },
}

impl Decision {
    pub fn thought(&self) -> &str {
        match self {
            Decision::Final { thought, .. } | Decision::Tool { thought, .. } => thought,
        }
    }
}

/// The JSON reply object, read leniently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredReply {
    pub thought: Option<String>,
    pub tool_name: Option<String>,
    pub tool_args: Option<serde_json::Value>,
    pub final_answer: Option<String>,
}

impl StructuredReply {
    /// Read the expected keys from any JSON object. Missing or oddly typed
    /// keys become `None` rather than errors.
    pub fn from_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let text = |key: &str| match object.get(key) {
            Some(serde_json::Value::String(s)) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        let tool_name = text("tool_name").filter(|name| {
            !matches!(name.to_ascii_lowercase().as_str(), "null" | "none" | "final_answer")
        });

        Self {
            thought: text("thought"),
            tool_name,
            tool_args: object.get("tool_args").filter(|v| !v.is_null()).cloned(),
            final_answer: text("final_answer"),
        }
    }

    /// A tool call wins over a final answer when both are present.
    ///
    /// `None` when neither field is populated.
    pub fn into_decision(self) -> Option<Decision> {
        let thought = self.thought.unwrap_or_default();
        if let Some(tool) = self.tool_name {
            let args = self.tool_args.map(ToolArgs::from).unwrap_or(ToolArgs::Map(Default::default()));
            return Some(Decision::Tool { tool, args, thought });
        }
        self.final_answer.map(|content| Decision::Final { content, thought })
    }
}

/// One way of finding a JSON reply in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The whole trimmed text is the object
    Direct,
    /// A ```json fenced block holds the object
    FencedJson,
    /// Raw code in a fence becomes a call to the code tool
    CodeBlock,
    /// The span from the first `{` to the last `}`
    BraceSpan,
}

impl ParseStrategy {
    /// The order strategies are tried in.
    pub const CHAIN: [ParseStrategy; 4] = [
        ParseStrategy::Direct,
        ParseStrategy::FencedJson,
        ParseStrategy::CodeBlock,
        ParseStrategy::BraceSpan,
    ];

    pub fn apply(self, text: &str, code_tool: &str) -> Option<StructuredReply> {
        match self {
            ParseStrategy::Direct => parse_object(text.trim()),
            ParseStrategy::FencedJson => FENCED_JSON
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_object(m.as_str())),
            ParseStrategy::CodeBlock => code_block_call(text, code_tool),
            ParseStrategy::BraceSpan => {
                let start = text.find('{')?;
                let end = text.rfind('}')?;
                (start < end).then(|| parse_object(&text[start..=end])).flatten()
            }
        }
    }
}

/// No strategy produced a structured object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("model output did not contain a usable decision")]
pub struct ParseFailure;

/// A successful structured parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub reply: StructuredReply,
    pub strategy: ParseStrategy,
}

/// Run the strategy chain over `text`.
///
/// Success only means an object was found; whether it carries a tool call
/// or an answer is checked by [`StructuredReply::into_decision`].
pub fn parse_structured(text: &str, code_tool: &str) -> Result<Parsed, ParseFailure> {
    for strategy in ParseStrategy::CHAIN {
        if let Some(reply) = strategy.apply(text, code_tool) {
            trace!(?strategy, "Parsed model reply");
            return Ok(Parsed { reply, strategy });
        }
    }
    Err(ParseFailure)
}

fn parse_object(candidate: &str) -> Option<StructuredReply> {
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Object(object)) => Some(StructuredReply::from_object(&object)),
        _ => None,
    }
}

fn code_block_call(text: &str, code_tool: &str) -> Option<StructuredReply> {
    FENCED_CODE.captures_iter(text).find_map(|caps| {
        let lang = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        if !matches!(lang.as_str(), "" | "python" | "py" | "python3") {
            return None;
        }
        let code = caps.get(2)?.as_str().trim();
        if code.chars().count() <= MIN_CODE_CHARS || !CODE_MARKERS.iter().any(|m| code.contains(m)) {
            return None;
        }
        Some(StructuredReply {
            thought: Some(format!("Model replied with raw code; running it with {code_tool}.")),
            tool_name: Some(code_tool.to_string()),
            tool_args: Some(serde_json::json!({ "code": code })),
            final_answer: None,
        })
    })
}

/// Parse the `Thought / Action / Action Input / Final Answer` format.
///
/// Never fails: text without either marker is a final answer.
pub fn parse_react(text: &str) -> Decision {
    if let Some((before, after)) = text.split_once("Final Answer:") {
        return Decision::Final {
            content: after.trim().to_string(),
            thought: before.trim().to_string(),
        };
    }

    if let Some(caps) = REACT_ACTION.captures(text) {
        let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let tool = caps
            .get(1)
            .map(|m| m.as_str().trim_matches(|c: char| c == '`' || c == '[' || c == ']' || c == '"' || c.is_whitespace()))
            .unwrap_or_default();
        let args = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !tool.is_empty() {
            return Decision::Tool {
                tool: tool.to_string(),
                args: ToolArgs::Raw(args.to_string()),
                thought: text[..whole].trim().to_string(),
            };
        }
    }

    Decision::Final {
        content: text.trim().to_string(),
        thought: String::new(),
    }
}
