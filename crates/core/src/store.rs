//! ConversationStore trait — the abstraction over conversation persistence.
//!
//! The agent loop treats persistence as best-effort: the in-memory history
//! is authoritative for the session, stores only make it survive restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Role, Turn};

/// Conversation identity without its turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: ConversationId,
    pub title: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage for conversations and their turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Create a conversation and return its id.
    async fn create_conversation(&self, title: &str, mode: &str) -> Result<ConversationId, StoreError>;

    /// Append one turn. Fails with `ConversationNotFound` for an unknown id.
    async fn add_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        meta: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError>;

    /// Append several turns atomically: all land, or none do.
    async fn add_exchange(&self, conversation_id: &ConversationId, turns: &[Turn]) -> Result<(), StoreError>;

    /// The last `limit` turns, oldest first.
    async fn get_messages(&self, conversation_id: &ConversationId, limit: usize) -> Result<Vec<Turn>, StoreError>;

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<ConversationInfo, StoreError>;

    /// All conversations, newest first.
    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>, StoreError>;

    async fn rename_conversation(&self, conversation_id: &ConversationId, title: &str) -> Result<(), StoreError>;

    async fn update_mode(&self, conversation_id: &ConversationId, mode: &str) -> Result<(), StoreError>;

    /// Delete a conversation and all its turns.
    async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<(), StoreError>;

    /// Load a conversation with up to `limit` of its most recent turns.
    async fn load_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Conversation, StoreError> {
        let info = self.get_conversation(conversation_id).await?;
        let turns = self.get_messages(conversation_id, limit).await?;
        Ok(Conversation {
            id: info.id,
            title: info.title,
            mode: info.mode,
            created_at: info.created_at,
            turns,
        })
    }
}
