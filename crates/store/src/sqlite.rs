//! SQLite conversation store.
//!
//! Uses a single SQLite database file with two tables:
//! - `conversations` — identity, title, mode, creation time
//! - `messages` — turns, ordered by an autoincrement sequence
//!
//! Deleting a conversation cascades to its messages.

use async_trait::async_trait;
use chrono::Utc;
use lokal_core::error::StoreError;
use lokal_core::message::{ConversationId, Role, Turn};
use lokal_core::store::{ConversationInfo, ConversationStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = if in_memory || path.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(path)
                .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
        } else {
            SqliteConnectOptions::new().filename(path)
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        // Every connection to ":memory:" is a separate database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY NOT NULL,
                title       TEXT NOT NULL,
                mode        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system', 'tool')),
                content         TEXT NOT NULL,
                meta            TEXT NOT NULL DEFAULT '{}',
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `Turn` from a SQLite row.
    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let meta_json: String = row
            .try_get("meta")
            .map_err(|e| StoreError::QueryFailed(format!("meta column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let role = Role::from_str(&role_str).map_err(StoreError::QueryFailed)?;
        let metadata = serde_json::from_str(&meta_json).unwrap_or_default();
        let timestamp = parse_timestamp(&created_at_str);

        Ok(Turn {
            id,
            role,
            content,
            timestamp,
            metadata,
        })
    }

    fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationInfo, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let mode: String = row
            .try_get("mode")
            .map_err(|e| StoreError::QueryFailed(format!("mode column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(ConversationInfo {
            id: ConversationId(id),
            title,
            mode,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    async fn exists<'e, E>(executor: E, conversation_id: &ConversationId) -> Result<bool, StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row = sqlx::query("SELECT 1 FROM conversations WHERE id = ?")
            .bind(conversation_id.as_str())
            .fetch_optional(executor)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("exists: {e}")))?;
        Ok(row.is_some())
    }
}

fn parse_timestamp(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn meta_to_json(meta: &serde_json::Map<String, serde_json::Value>) -> String {
    serde_json::Value::Object(meta.clone()).to_string()
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(&self, title: &str, mode: &str) -> Result<ConversationId, StoreError> {
        let id = ConversationId::new();
        sqlx::query("INSERT INTO conversations (id, title, mode, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.as_str())
            .bind(title)
            .bind(mode)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("create conversation: {e}")))?;
        debug!(conversation_id = %id, "Conversation created");
        Ok(id)
    }

    async fn add_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        meta: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        if !Self::exists(&mut *tx, conversation_id).await? {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, meta, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id.as_str())
        .bind(role.as_str())
        .bind(content)
        .bind(meta_to_json(meta))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert message: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(id)
    }

    async fn add_exchange(&self, conversation_id: &ConversationId, turns: &[Turn]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        if !Self::exists(&mut *tx, conversation_id).await? {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }

        for turn in turns {
            sqlx::query(
                "INSERT INTO messages (id, conversation_id, role, content, meta, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&turn.id)
            .bind(conversation_id.as_str())
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(meta_to_json(&turn.metadata))
            .bind(turn.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("insert message: {e}")))?;
        }

        // Dropping the transaction without commit rolls everything back
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        debug!(conversation_id = %conversation_id, turns = turns.len(), "Exchange persisted");
        Ok(())
    }

    async fn get_messages(&self, conversation_id: &ConversationId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        if !Self::exists(&self.pool, conversation_id).await? {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, role, content, meta, created_at FROM (
                SELECT seq, id, role, content, meta, created_at
                FROM messages
                WHERE conversation_id = ?
                ORDER BY seq DESC
                LIMIT ?
            ) ORDER BY seq ASC
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get messages: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<ConversationInfo, StoreError> {
        let row = sqlx::query("SELECT id, title, mode, created_at FROM conversations WHERE id = ?")
            .bind(conversation_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get conversation: {e}")))?;

        match row {
            Some(row) => Self::row_to_info(&row),
            None => Err(StoreError::ConversationNotFound(conversation_id.to_string())),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, mode, created_at FROM conversations ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list conversations: {e}")))?;

        rows.iter().map(Self::row_to_info).collect()
    }

    async fn rename_conversation(&self, conversation_id: &ConversationId, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("rename: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        Ok(())
    }

    async fn update_mode(&self, conversation_id: &ConversationId, mode: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET mode = ? WHERE id = ?")
            .bind(mode)
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("update mode: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("delete: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        debug!(conversation_id = %conversation_id, "Conversation deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_conversation() {
        let db = test_store().await;
        let id = db.create_conversation("New Chat", "chat").await.unwrap();
        let info = db.get_conversation(&id).await.unwrap();
        assert_eq!(info.title, "New Chat");
        assert_eq!(info.mode, "chat");
    }

    #[tokio::test]
    async fn add_message_roundtrip_with_meta() {
        let db = test_store().await;
        let id = db.create_conversation("t", "agent").await.unwrap();
        let mut meta = serde_json::Map::new();
        meta.insert("tool".into(), "web_search".into());
        db.add_message(&id, Role::Tool, "Lima is the capital", &meta).await.unwrap();

        let turns = db.get_messages(&id, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Tool);
        assert_eq!(turns[0].metadata["tool"], "web_search");
    }

    #[tokio::test]
    async fn add_message_to_missing_conversation_fails() {
        let db = test_store().await;
        let err = db
            .add_message(&ConversationId::from("ghost"), Role::User, "hi", &serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(err.is_conversation_missing());
    }

    #[tokio::test]
    async fn exchange_is_all_or_nothing() {
        let db = test_store().await;
        let id = db.create_conversation("t", "chat").await.unwrap();

        let user = Turn::user("first");
        // Reusing the same turn id violates the UNIQUE constraint on the second insert
        let duplicate = user.clone();
        assert!(db.add_exchange(&id, &[user, duplicate]).await.is_err());
        assert!(db.get_messages(&id, 10).await.unwrap().is_empty());

        db.add_exchange(&id, &[Turn::user("q"), Turn::assistant("a")]).await.unwrap();
        assert_eq!(db.get_messages(&id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_messages_returns_last_n_ascending() {
        let db = test_store().await;
        let id = db.create_conversation("t", "chat").await.unwrap();
        for i in 0..6 {
            db.add_message(&id, Role::User, &format!("m{i}"), &serde_json::Map::new())
                .await
                .unwrap();
        }
        let turns = db.get_messages(&id, 3).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let db = test_store().await;
        let id = db.create_conversation("t", "chat").await.unwrap();
        db.add_exchange(&id, &[Turn::user("q"), Turn::assistant("a")]).await.unwrap();
        db.delete_conversation(&id).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.get_conversation(&id).await.unwrap_err().is_conversation_missing());
    }

    #[tokio::test]
    async fn rename_update_and_list() {
        let db = test_store().await;
        let a = db.create_conversation("a", "chat").await.unwrap();
        let b = db.create_conversation("b", "chat").await.unwrap();
        db.rename_conversation(&a, "renamed").await.unwrap();
        db.update_mode(&b, "analyst").await.unwrap();

        let list = db.list_conversations().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|c| c.title == "renamed"));
        assert!(list.iter().any(|c| c.mode == "analyst"));
        assert!(db.rename_conversation(&ConversationId::from("nope"), "x").await.is_err());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lokal.db");
        let path = path.to_str().unwrap();

        let id = {
            let db = SqliteStore::new(path).await.unwrap();
            let id = db.create_conversation("persist", "chat").await.unwrap();
            db.add_exchange(&id, &[Turn::user("q"), Turn::assistant("a")]).await.unwrap();
            id
        };

        let db = SqliteStore::new(path).await.unwrap();
        let conv = db.load_conversation(&id, 20).await.unwrap();
        assert_eq!(conv.title, "persist");
        assert_eq!(conv.turns.len(), 2);
        assert_eq!(conv.turns[1].role, Role::Assistant);
    }
}
