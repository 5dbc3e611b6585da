//! Per-conversation ordered write queue.
//!
//! Each conversation gets its own background task draining its own queue,
//! so a slow write in one conversation never delays another. Jobs are
//! applied strictly in enqueue order. Failures are logged and published on
//! the event bus; they never reach the caller.

use chrono::Utc;
use lokal_core::event::{DomainEvent, EventBus};
use lokal_core::message::{ConversationId, Turn};
use lokal_core::store::ConversationStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum WriteJob {
    /// Turns that must land together
    Exchange(Vec<Turn>),
    UpdateMode(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to a conversation's write queue.
pub struct ConversationWriter {
    tx: mpsc::UnboundedSender<WriteJob>,
    id_rx: watch::Receiver<ConversationId>,
    handle: JoinHandle<()>,
}

impl ConversationWriter {
    /// Start the queue for an existing conversation.
    ///
    /// `title` and `mode` are used if the store lost the conversation and it
    /// has to be recreated.
    pub fn spawn(
        store: Arc<dyn ConversationStore>,
        conversation_id: ConversationId,
        title: impl Into<String>,
        mode: impl Into<String>,
        events: Option<EventBus>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (id_tx, id_rx) = watch::channel(conversation_id);
        let worker = Worker {
            store,
            title: title.into(),
            mode: mode.into(),
            id_tx,
            events,
        };
        let handle = tokio::spawn(worker.run(rx));
        Self { tx, id_rx, handle }
    }

    /// Queue turns to be written atomically, after everything queued before.
    pub fn enqueue_exchange(&self, turns: Vec<Turn>) {
        if turns.is_empty() {
            return;
        }
        if self.tx.send(WriteJob::Exchange(turns)).is_err() {
            warn!("Conversation writer stopped; exchange dropped");
        }
    }

    /// Queue a mode change.
    pub fn enqueue_mode(&self, mode: impl Into<String>) {
        if self.tx.send(WriteJob::UpdateMode(mode.into())).is_err() {
            warn!("Conversation writer stopped; mode change dropped");
        }
    }

    /// The id writes currently go to. Changes if the conversation was recreated.
    pub fn conversation_id(&self) -> ConversationId {
        self.id_rx.borrow().clone()
    }

    /// Observe id changes.
    pub fn subscribe_id(&self) -> watch::Receiver<ConversationId> {
        self.id_rx.clone()
    }

    /// Wait until every job queued so far has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drain the queue and stop the task.
    pub async fn shutdown(self) {
        let Self { tx, handle, .. } = self;
        drop(tx);
        if let Err(e) = handle.await {
            warn!(error = %e, "Conversation writer task ended abnormally");
        }
    }
}

struct Worker {
    store: Arc<dyn ConversationStore>,
    title: String,
    mode: String,
    id_tx: watch::Sender<ConversationId>,
    events: Option<EventBus>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
        while let Some(job) = rx.recv().await {
            match job {
                WriteJob::Exchange(turns) => self.write_exchange(&turns).await,
                WriteJob::UpdateMode(mode) => {
                    let id = self.current_id();
                    if let Err(e) = self.store.update_mode(&id, &mode).await {
                        self.report(&id, &e.to_string());
                    }
                    self.mode = mode;
                }
                WriteJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Conversation writer drained");
    }

    fn current_id(&self) -> ConversationId {
        self.id_tx.borrow().clone()
    }

    async fn write_exchange(&mut self, turns: &[Turn]) {
        let id = self.current_id();
        match self.store.add_exchange(&id, turns).await {
            Ok(()) => {}
            Err(e) if e.is_conversation_missing() => {
                // Recreate once, then retry once
                match self.store.create_conversation(&self.title, &self.mode).await {
                    Ok(new_id) => {
                        info!(old = %id, new = %new_id, "Conversation missing from store; recreated");
                        self.id_tx.send_replace(new_id.clone());
                        if let Err(e) = self.store.add_exchange(&new_id, turns).await {
                            self.report(&new_id, &e.to_string());
                        }
                    }
                    Err(e) => self.report(&id, &e.to_string()),
                }
            }
            Err(e) => self.report(&id, &e.to_string()),
        }
    }

    fn report(&self, id: &ConversationId, error: &str) {
        warn!(conversation_id = %id, error = %error, "Persistence failed");
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::PersistenceFailed {
                conversation_id: id.to_string(),
                error_message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}
