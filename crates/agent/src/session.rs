//! Per-conversation context passed explicitly into every agent turn.

use lokal_core::error::StoreError;
use lokal_core::event::EventBus;
use lokal_core::message::{ConversationId, Turn};
use lokal_core::store::ConversationStore;
use lokal_store::ConversationWriter;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::ContextManager;

/// Everything one conversation needs between turns.
///
/// Owned by the caller and lent to [`AgentLoop`](crate::AgentLoop) for
/// each turn. A session without a writer keeps its history in memory only.
pub struct ConversationSession {
    id: ConversationId,
    title: String,
    mode: String,
    context: ContextManager,
    writer: Option<ConversationWriter>,
}

impl ConversationSession {
    /// A session that is never persisted.
    pub fn ephemeral(mode: impl Into<String>, context: ContextManager) -> Self {
        Self {
            id: ConversationId::new(),
            title: "untitled".into(),
            mode: mode.into(),
            context,
            writer: None,
        }
    }

    /// Create a new conversation in `store`.
    pub async fn start(
        store: Arc<dyn ConversationStore>,
        title: &str,
        mode: &str,
        context: ContextManager,
        events: Option<EventBus>,
    ) -> Result<Self, StoreError> {
        let id = store.create_conversation(title, mode).await?;
        info!(conversation_id = %id, mode = %mode, "Conversation started");
        let writer = ConversationWriter::spawn(store, id.clone(), title, mode, events);
        Ok(Self {
            id,
            title: title.to_string(),
            mode: mode.to_string(),
            context,
            writer: Some(writer),
        })
    }

    /// Reopen a stored conversation.
    ///
    /// When `context` holds no turns yet, the last `history_window` turns are
    /// loaded into it from the store.
    pub async fn resume(
        store: Arc<dyn ConversationStore>,
        id: &ConversationId,
        mut context: ContextManager,
        history_window: usize,
        events: Option<EventBus>,
    ) -> Result<Self, StoreError> {
        let info = store.get_conversation(id).await?;
        if context.is_empty() {
            let turns = store.get_messages(id, history_window).await?;
            debug!(conversation_id = %id, turns = turns.len(), "Rehydrated history");
            context.set_history(turns);
        }
        let writer = ConversationWriter::spawn(store, info.id.clone(), info.title.as_str(), info.mode.as_str(), events);
        Ok(Self {
            id: info.id,
            title: info.title,
            mode: info.mode,
            context,
            writer: Some(writer),
        })
    }

    /// The id writes go to. Follows the writer if it had to recreate the
    /// conversation.
    pub fn id(&self) -> ConversationId {
        match &self.writer {
            Some(writer) => writer.conversation_id(),
            None => self.id.clone(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Switch mode for the following turns.
    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = mode.into();
        if let Some(writer) = &self.writer {
            writer.enqueue_mode(self.mode.clone());
        }
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextManager {
        &mut self.context
    }

    pub fn is_persistent(&self) -> bool {
        self.writer.is_some()
    }

    /// Record a finished exchange: both turns go into the history, and are
    /// queued as one write.
    pub async fn commit(&mut self, user: Turn, assistant: Turn) {
        if let Some(writer) = &self.writer {
            writer.enqueue_exchange(vec![user.clone(), assistant.clone()]);
        }
        self.context.append(user).await;
        self.context.append(assistant).await;
    }

    /// Wait for queued writes to land.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    /// Drain pending writes and stop the writer.
    pub async fn close(self) {
        if let Some(writer) = self.writer {
            writer.shutdown().await;
        }
    }
}
