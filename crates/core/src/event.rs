//! Domain event system — observe the agent loop without coupling to it.
//!
//! Events are published when something interesting happens during a turn.
//! UIs, loggers and tests subscribe and filter for what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user message entered the agent loop
    TurnStarted {
        conversation_id: String,
        mode: String,
        routed_tool: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The model backend produced a response for one step
    ResponseGenerated {
        conversation_id: String,
        model: String,
        step: usize,
        chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Older history was folded into a summary turn
    SummaryCreated {
        replaced_turns: usize,
        timestamp: DateTime<Utc>,
    },

    /// A write to the conversation store did not land
    PersistenceFailed {
        conversation_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The loop reached a terminal state for this turn
    TurnCompleted {
        conversation_id: String,
        status: String,
        steps: usize,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "web_search".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "web_search");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::PersistenceFailed {
            conversation_id: "c1".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn cloned_bus_shares_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.clone().publish(DomainEvent::SummaryCreated { replaced_turns: 40, timestamp: Utc::now() });
        assert!(matches!(rx.recv().await.unwrap().as_ref(), DomainEvent::SummaryCreated { replaced_turns: 40, .. }));
    }
}
