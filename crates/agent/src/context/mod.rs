//! Conversation context: the active window of turns for one conversation.
//!
//! The [`ContextManager`] keeps the in-memory, ordered history the agent
//! loop reads from. Once the history grows past a threshold, the oldest
//! block is compressed into a single summary turn by a pluggable
//! [`Summarizer`].

pub mod summarizer;
pub mod token;

pub use summarizer::{ProviderSummarizer, Summarizer};
pub use token::{estimate_tokens, estimate_turn_tokens, estimate_turns_tokens};

use chrono::Utc;
use lokal_config::ContextConfig;
use lokal_core::event::{DomainEvent, EventBus};
use lokal_core::message::Turn;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owns the ordered turn history for the conversation being served.
pub struct ContextManager {
    history: Vec<Turn>,
    summary_threshold: usize,
    keep_recent: usize,
    summarizer: Option<Arc<dyn Summarizer>>,
    summarizer_timeout: Duration,
    token_budget: Option<usize>,
    events: Option<EventBus>,
}

impl ContextManager {
    pub fn new(summary_threshold: usize, keep_recent: usize) -> Self {
        Self {
            history: Vec::new(),
            summary_threshold: summary_threshold.max(2),
            keep_recent,
            summarizer: None,
            summarizer_timeout: Duration::from_secs(30),
            token_budget: None,
            events: None,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        let mut manager = Self::new(config.summary_threshold, config.keep_recent);
        manager.summarizer_timeout = Duration::from_secs(config.summarizer_timeout_secs.max(1));
        manager.token_budget = config.token_budget;
        manager
    }

    /// Attach the collaborator that compresses old turns.
    ///
    /// Without one, history only grows.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_summarizer_timeout(mut self, timeout: Duration) -> Self {
        self.summarizer_timeout = timeout;
        self
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Add a turn to the tail, summarizing the oldest block once the
    /// threshold is reached.
    ///
    /// Waits at most the summarizer timeout. A failed or slow summary
    /// leaves the history exactly as it was.
    pub async fn append(&mut self, turn: Turn) {
        self.history.push(turn);
        if self.summarizer.is_some() && self.history.len() >= self.summary_threshold {
            self.summarize_oldest().await;
        }
    }

    async fn summarize_oldest(&mut self) {
        let Some(summarizer) = self.summarizer.clone() else {
            return;
        };

        let keep = self.keep_recent.min(self.history.len().saturating_sub(1));
        let split = self.history.len() - keep;
        if split < 2 {
            return;
        }

        debug!(turns = split, "Summarizing oldest block of history");

        let block = &self.history[..split];
        match tokio::time::timeout(self.summarizer_timeout, summarizer.summarize(block)).await {
            Ok(Ok(text)) => {
                self.history.splice(..split, [Turn::summary(text)]);
                info!(replaced_turns = split, remaining = self.history.len(), "History summarized");
                if let Some(bus) = &self.events {
                    bus.publish(DomainEvent::SummaryCreated {
                        replaced_turns: split,
                        timestamp: Utc::now(),
                    });
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Summarizer failed; keeping full history"),
            Err(_) => warn!(
                timeout_secs = self.summarizer_timeout.as_secs(),
                "Summarizer timed out; keeping full history"
            ),
        }
    }

    /// The last `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    /// Replace the whole history, e.g. after loading from the store.
    pub fn set_history(&mut self, turns: Vec<Turn>) {
        self.history = turns;
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Fit a window of turns into the token budget, dropping the oldest.
    ///
    /// With no budget configured this returns the turns unchanged. The
    /// newest turn is always kept.
    pub fn trim(&self, turns: &[Turn]) -> Vec<Turn> {
        let Some(budget) = self.token_budget else {
            return turns.to_vec();
        };

        let mut used = 0;
        let mut start = turns.len();
        for (idx, turn) in turns.iter().enumerate().rev() {
            let cost = estimate_turn_tokens(turn);
            if used + cost > budget && start < turns.len() {
                break;
            }
            used += cost;
            start = idx;
        }
        if start > 0 {
            debug!(dropped = start, budget, "Trimmed history to token budget");
        }
        turns[start..].to_vec()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingSummarizer, SlowSummarizer, StaticSummarizer};

    fn contents(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.content.as_str()).collect()
    }

    #[tokio::test]
    async fn append_then_recent_keeps_order() {
        let mut ctx = ContextManager::new(50, 10);
        for i in 0..5 {
            ctx.append(Turn::user(format!("m{i}"))).await;
        }
        assert_eq!(contents(ctx.recent(3)), vec!["m2", "m3", "m4"]);
        assert_eq!(ctx.recent(100).len(), 5);
    }

    #[test]
    fn empty_history_is_fine() {
        let ctx = ContextManager::new(50, 10);
        assert!(ctx.recent(10).is_empty());
        assert!(ctx.trim(&[]).is_empty());
    }

    #[tokio::test]
    async fn threshold_replaces_oldest_block_with_summary() {
        let summarizer = Arc::new(StaticSummarizer::new("earlier: greetings"));
        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let mut ctx = ContextManager::new(6, 2)
            .with_summarizer(summarizer.clone())
            .with_event_bus(bus);

        for i in 0..6 {
            ctx.append(Turn::user(format!("m{i}"))).await;
        }

        assert_eq!(ctx.len(), 3);
        assert!(ctx.turns()[0].is_summary());
        assert_eq!(ctx.turns()[0].content, "earlier: greetings");
        assert_eq!(contents(&ctx.turns()[1..]), vec!["m4", "m5"]);
        assert_eq!(summarizer.seen(), 4);

        let event = events.recv().await.unwrap();
        assert!(matches!(*event, DomainEvent::SummaryCreated { replaced_turns: 4, .. }));
    }

    #[tokio::test]
    async fn summarizer_failure_keeps_every_turn() {
        let mut ctx = ContextManager::new(3, 1).with_summarizer(Arc::new(FailingSummarizer));
        for i in 0..4 {
            ctx.append(Turn::user(format!("m{i}"))).await;
        }
        assert_eq!(contents(ctx.turns()), vec!["m0", "m1", "m2", "m3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_summarizer_is_abandoned() {
        let mut ctx = ContextManager::new(3, 1)
            .with_summarizer(Arc::new(SlowSummarizer(Duration::from_secs(120))))
            .with_summarizer_timeout(Duration::from_secs(5));
        for i in 0..3 {
            ctx.append(Turn::user(format!("m{i}"))).await;
        }
        assert_eq!(ctx.len(), 3);
        assert!(!ctx.turns()[0].is_summary());
    }

    #[test]
    fn trim_without_budget_is_identity() {
        let ctx = ContextManager::new(50, 10);
        let turns = vec![Turn::user("a"), Turn::assistant("b")];
        assert_eq!(ctx.trim(&turns), turns);
    }

    #[test]
    fn trim_with_budget_drops_oldest() {
        let ctx = ContextManager::new(50, 10).with_token_budget(12);
        // each turn: 4 chars → 1 token + 4 overhead = 5
        let turns = vec![Turn::user("aaaa"), Turn::assistant("bbbb"), Turn::user("cccc")];
        assert_eq!(contents(&ctx.trim(&turns)), vec!["bbbb", "cccc"]);
    }

    #[test]
    fn trim_always_keeps_newest() {
        let ctx = ContextManager::new(50, 10).with_token_budget(1);
        let turns = vec![Turn::user("x".repeat(100))];
        assert_eq!(ctx.trim(&turns).len(), 1);
    }

    #[tokio::test]
    async fn set_history_then_append_and_reset() {
        let mut ctx = ContextManager::new(50, 10);
        ctx.set_history(vec![Turn::user("old"), Turn::assistant("reply")]);
        ctx.append(Turn::user("new")).await;
        assert_eq!(contents(ctx.turns()), vec!["old", "reply", "new"]);
        ctx.reset();
        assert!(ctx.is_empty());
    }
}
