//! The agent loop and everything it reasons with.
//!
//! One turn follows a **Generate → Parse → Act → Observe** cycle:
//!
//! 1. **Route** the user message: at most one tool is suggested by rule
//! 2. **Build context** (system prompt + windowed history + this turn's observations)
//! 3. **Generate** via the configured model backend
//! 4. **Parse** the raw text into a decision, retrying output that does not parse
//! 5. **If a tool call**: execute it, append the observation, loop back to step 3
//! 6. **If a final answer**: record the exchange and return it
//!
//! The loop stops at the first final answer, a terminal failure, or when the
//! mode's step budget is spent.

pub mod context;
pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod router;
pub mod sanitize;
pub mod session;
pub mod step_log;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use context::{ContextManager, ProviderSummarizer, Summarizer};
pub use loop_runner::{AgentLoop, TurnOutcome, TurnStatus};
pub use parser::{Decision, ParseFailure, ParseStrategy, StructuredReply, parse_react, parse_structured};
pub use prompt::{ReplyContract, build_system_prompt};
pub use router::{RouteDecision, RoutingPolicy};
pub use sanitize::CleanOutput;
pub use session::ConversationSession;
pub use step_log::{StepEntry, StepLog};
pub use stream_event::AgentStreamEvent;
