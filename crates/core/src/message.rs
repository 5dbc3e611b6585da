//! Turn and Conversation domain types.
//!
//! These are the value objects that flow through the entire system:
//! the user sends a turn → the agent loop reasons over the windowed history →
//! the model backend generates a turn → the store persists the exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key marking a synthetic summary turn.
pub const META_TYPE: &str = "type";
/// Value of [`META_TYPE`] on summary turns.
pub const META_SUMMARY: &str = "summary";

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries tool observations fed back to the model)
    User,
    /// The model
    Assistant,
    /// Instructions and synthetic summaries
    System,
    /// Tool output
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// One utterance in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// The text body
    pub content: String,

    /// When the turn was created
    pub timestamp: DateTime<Utc>,

    /// Open key/value bag (producing tool, summary marker, thought trace, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Turn {
    /// Create a turn with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool output turn tagged with the producing tool.
    pub fn tool(tool_name: &str, content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content).with_meta("tool", tool_name)
    }

    /// Create the synthetic system turn that replaces a summarized block.
    pub fn summary(content: impl Into<String>) -> Self {
        Self::system(content).with_meta(META_TYPE, META_SUMMARY)
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether this turn was produced by summarization.
    pub fn is_summary(&self) -> bool {
        self.role == Role::System
            && self.metadata.get(META_TYPE).and_then(|v| v.as_str()) == Some(META_SUMMARY)
    }
}

/// A conversation: identity plus an ordered, append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Display title
    pub title: String,

    /// The mode the conversation runs in (e.g. "chat", "analyst")
    pub mode: String,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// Ordered turns
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new(title: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            id: ConversationId::new(),
            title: title.into(),
            mode: mode.into(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.content.len() / 4).sum()
    }
}
