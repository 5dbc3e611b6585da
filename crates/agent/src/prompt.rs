//! System prompt construction.

use lokal_config::ReasoningFormat;
use lokal_core::tool::ToolDefinition;

/// The reply format requested from the model for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyContract {
    /// One JSON object per reply
    Json,
    /// `Thought / Action / Action Input` or `Final Answer` lines
    React,
    /// No tools available; the reply is the answer
    Plain,
}

impl ReplyContract {
    pub fn for_turn(format: ReasoningFormat, has_tools: bool) -> Self {
        match (has_tools, format) {
            (false, _) => ReplyContract::Plain,
            (true, ReasoningFormat::Json) => ReplyContract::Json,
            (true, ReasoningFormat::React) => ReplyContract::React,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyContract::Json => "json",
            ReplyContract::React => "react",
            ReplyContract::Plain => "plain",
        }
    }
}

const BASE_PROMPT: &str = "You are lokal, a helpful assistant running on the user's own machine.";

const JSON_CONTRACT: &str = r#"Reply with exactly one JSON object and nothing else:
{
  "thought": "why you are calling a tool or how you will answer",
  "tool_name": "<one tool name from the list> or null",
  "tool_args": { ... arguments for the tool ... },
  "final_answer": "answer for the user, null when tool_name is set"
}
Call at most one tool per reply. After each call you will receive "Observation: ..." with its result."#;

const REACT_CONTRACT: &str = "To use a tool, reply with:
Thought: why you need the tool
Action: <one tool name from the list>
Action Input: the arguments, as JSON or plain text

Then stop and wait for \"Observation: ...\". When you can answer, reply with:
Thought: your reasoning
Final Answer: the answer for the user";

const PLAIN_CONTRACT: &str = "Answer the user directly and concisely.";

/// Build the system prompt for one turn.
///
/// `routed_tool` is the routing policy's pick, passed on as a hint.
pub fn build_system_prompt(
    contract: ReplyContract,
    mode_prompt: Option<&str>,
    tools: &[ToolDefinition],
    routed_tool: Option<&str>,
) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    if let Some(extra) = mode_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }

    if contract != ReplyContract::Plain && !tools.is_empty() {
        prompt.push_str("\n\n## Tools\n");
        for tool in tools {
            prompt.push_str(&format!(
                "- {}: {}\n  Args schema: {}\n",
                tool.name, tool.description, tool.parameters
            ));
        }
    }

    prompt.push_str("\n\n## Output format\n");
    prompt.push_str(match contract {
        ReplyContract::Json => JSON_CONTRACT,
        ReplyContract::React => REACT_CONTRACT,
        ReplyContract::Plain => PLAIN_CONTRACT,
    });

    if contract != ReplyContract::Plain {
        if let Some(tool) = routed_tool {
            prompt.push_str(&format!(
                "\n\nHint: this request most likely needs the `{tool}` tool."
            ));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_def() -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the internet".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn contract_selection() {
        assert_eq!(ReplyContract::for_turn(ReasoningFormat::Json, true), ReplyContract::Json);
        assert_eq!(ReplyContract::for_turn(ReasoningFormat::React, true), ReplyContract::React);
        assert_eq!(ReplyContract::for_turn(ReasoningFormat::React, false), ReplyContract::Plain);
    }

    #[test]
    fn json_prompt_lists_tools_and_hint() {
        let prompt = build_system_prompt(ReplyContract::Json, Some("Be precise."), &[search_def()], Some("web_search"));
        assert!(prompt.contains("Be precise."));
        assert!(prompt.contains("- web_search: Search the internet"));
        assert!(prompt.contains("\"final_answer\""));
        assert!(prompt.contains("`web_search` tool"));
    }

    #[test]
    fn react_prompt_describes_markers() {
        let prompt = build_system_prompt(ReplyContract::React, None, &[search_def()], None);
        assert!(prompt.contains("Action Input:"));
        assert!(prompt.contains("Final Answer:"));
        assert!(!prompt.contains("Hint:"));
    }

    #[test]
    fn plain_prompt_has_no_tools() {
        let prompt = build_system_prompt(ReplyContract::Plain, None, &[search_def()], Some("web_search"));
        assert!(!prompt.contains("## Tools"));
        assert!(!prompt.contains("Hint:"));
        assert!(prompt.ends_with(PLAIN_CONTRACT));
    }
}
