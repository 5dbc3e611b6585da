//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use lokal_core::error::StoreError;
use lokal_core::message::{ConversationId, Role, Turn};
use lokal_core::store::{ConversationInfo, ConversationStore};
use std::sync::Arc;
use tokio::sync::RwLock;

struct Record {
    info: ConversationInfo,
    turns: Vec<Turn>,
}

/// A store that keeps conversations in a Vec, in creation order.
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<Record>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &ConversationId) -> StoreError {
    StoreError::ConversationNotFound(id.to_string())
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_conversation(&self, title: &str, mode: &str) -> Result<ConversationId, StoreError> {
        let id = ConversationId::new();
        self.records.write().await.push(Record {
            info: ConversationInfo {
                id: id.clone(),
                title: title.to_string(),
                mode: mode.to_string(),
                created_at: Utc::now(),
            },
            turns: Vec::new(),
        });
        Ok(id)
    }

    async fn add_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        meta: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.info.id == conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        let mut turn = Turn::new(role, content);
        turn.metadata = meta.clone();
        let id = turn.id.clone();
        record.turns.push(turn);
        Ok(id)
    }

    async fn add_exchange(&self, conversation_id: &ConversationId, turns: &[Turn]) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.info.id == conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        record.turns.extend_from_slice(turns);
        Ok(())
    }

    async fn get_messages(&self, conversation_id: &ConversationId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let records = self.records.read().await;
        let record = records
            .iter()
            .find(|r| &r.info.id == conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        let start = record.turns.len().saturating_sub(limit);
        Ok(record.turns[start..].to_vec())
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<ConversationInfo, StoreError> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| &r.info.id == conversation_id)
            .map(|r| r.info.clone())
            .ok_or_else(|| not_found(conversation_id))
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().map(|r| r.info.clone()).collect())
    }

    async fn rename_conversation(&self, conversation_id: &ConversationId, title: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.info.id == conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        record.info.title = title.to_string();
        Ok(())
    }

    async fn update_mode(&self, conversation_id: &ConversationId, mode: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.info.id == conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        record.info.mode = mode.to_string();
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let len_before = records.len();
        records.retain(|r| &r.info.id != conversation_id);
        if records.len() == len_before {
            return Err(not_found(conversation_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_append() {
        let store = InMemoryStore::new();
        let id = store.create_conversation("New Chat", "chat").await.unwrap();
        store
            .add_message(&id, Role::User, "hello", &serde_json::Map::new())
            .await
            .unwrap();
        let turns = store.get_messages(&id, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "hello");
    }

    #[tokio::test]
    async fn add_message_to_missing_conversation_fails() {
        let store = InMemoryStore::new();
        let err = store
            .add_message(&ConversationId::from("ghost"), Role::User, "x", &serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(err.is_conversation_missing());
    }

    #[tokio::test]
    async fn get_messages_returns_tail_in_order() {
        let store = InMemoryStore::new();
        let id = store.create_conversation("t", "chat").await.unwrap();
        let turns: Vec<Turn> = (0..5).map(|i| Turn::user(format!("m{i}"))).collect();
        store.add_exchange(&id, &turns).await.unwrap();
        let tail = store.get_messages(&id, 2).await.unwrap();
        let contents: Vec<&str> = tail.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_delete_removes() {
        let store = InMemoryStore::new();
        let first = store.create_conversation("first", "chat").await.unwrap();
        let second = store.create_conversation("second", "agent").await.unwrap();
        let list = store.list_conversations().await.unwrap();
        assert_eq!(list[0].id, second);
        assert_eq!(list[1].id, first);

        store.delete_conversation(&first).await.unwrap();
        assert_eq!(store.list_conversations().await.unwrap().len(), 1);
        assert!(store.delete_conversation(&first).await.is_err());
    }

    #[tokio::test]
    async fn rename_and_update_mode() {
        let store = InMemoryStore::new();
        let id = store.create_conversation("old", "chat").await.unwrap();
        store.rename_conversation(&id, "Peru trivia").await.unwrap();
        store.update_mode(&id, "agent").await.unwrap();
        let info = store.get_conversation(&id).await.unwrap();
        assert_eq!(info.title, "Peru trivia");
        assert_eq!(info.mode, "agent");
    }
}
