//! The agent reasoning loop implementation.
//!
//! One call to [`AgentLoop::run_turn`] takes a user message through
//! `BUILD_CONTEXT → GENERATE → PARSE → {EXECUTE_TOOL → GENERATE | FINAL}`
//! until a final answer, a terminal failure or the step budget. Every
//! path ends with exactly one user-visible reply.

use chrono::Utc;
use lokal_config::{AppConfig, LiveConfig, ModeConfig};
use lokal_core::error::ProviderError;
use lokal_core::event::{DomainEvent, EventBus};
use lokal_core::message::Turn;
use lokal_core::provider::{GenerationParams, Provider, ProviderRequest};
use lokal_core::tool::{ToolArgs, ToolDefinition, ToolRegistry, split_artifact};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::parser::{Decision, parse_react, parse_structured};
use crate::prompt::{ReplyContract, build_system_prompt};
use crate::router::{RouteDecision, RoutingPolicy};
use crate::sanitize::{strip_markers, tidy};
use crate::session::ConversationSession;
use crate::step_log::StepLog;
use crate::stream_event::AgentStreamEvent;

const NO_DECISION_REPLY: &str =
    "I could not reach a decision for this request. Please rephrase it or try again.";
const BUDGET_REPLY: &str = "I ran out of steps before reaching an answer. Please narrow the request.";
const CANCELLED_REPLY: &str = "Request cancelled.";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model gave a final answer
    Final,
    /// `max_steps` ran out; the reply is the last model text
    BudgetExhausted,
    /// Output never parsed, or parsed with neither tool nor answer
    NoDecision,
    /// Every model call in the step failed on transport
    ModelUnavailable,
    /// The caller cancelled
    Cancelled,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Final => "final",
            TurnStatus::BudgetExhausted => "budget_exhausted",
            TurnStatus::NoDecision => "no_decision",
            TurnStatus::ModelUnavailable => "model_unavailable",
            TurnStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the exchange is kept in history and written to the store.
    pub fn is_committed(&self) -> bool {
        matches!(self, TurnStatus::Final | TurnStatus::BudgetExhausted)
    }
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text for the user; never empty
    pub reply: String,
    pub thought: Option<String>,
    pub status: TurnStatus,
    pub steps: StepLog,
    /// Artifact paths reported by tools, in order
    pub artifacts: Vec<String>,
    pub route: RouteDecision,
    /// Generate/execute cycles started
    pub steps_taken: usize,
}

/// The core agent loop that orchestrates model calls and tool execution.
///
/// Shared by every conversation: all per-conversation state lives in the
/// [`ConversationSession`] passed to each turn.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: LiveConfig,
    events: Option<EventBus>,
}

/// Parameters fixed for the duration of one turn.
struct TurnPlan {
    contract: ReplyContract,
    mode: ModeConfig,
    model: String,
    code_tool: String,
    timeout: Duration,
    stream: bool,
    conversation_id: String,
}

/// What one step's generate/parse attempts produced.
enum Attempt {
    Decided { decision: Decision, text: String },
    Undecided,
    Unavailable { degraded: String },
    Cancelled,
}

enum Reading {
    Decision(Decision),
    /// Parsed, but carried neither tool nor answer
    Empty,
    Unparsed,
}

/// Mutable record of a turn in progress.
struct TurnRun {
    steps: StepLog,
    artifacts: Vec<String>,
    /// Model replies and observations from earlier steps of this turn
    scratch: Vec<Turn>,
    last_text: Option<String>,
    steps_taken: usize,
}

struct Ending {
    status: TurnStatus,
    reply: String,
    thought: Option<String>,
}

impl Ending {
    fn new(status: TurnStatus, reply: impl Into<String>) -> Self {
        Self {
            status,
            reply: reply.into(),
            thought: None,
        }
    }
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: LiveConfig) -> Self {
        Self {
            provider,
            tools,
            config,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Process one user message without streaming or cancellation.
    pub async fn run_turn(&self, session: &mut ConversationSession, message: &str) -> TurnOutcome {
        self.run_turn_with(session, message, None, &CancellationToken::new()).await
    }

    /// Process one user message.
    ///
    /// Progress is sent to `stream` when given. `cancel` is checked before
    /// every step and interrupts a pending model call or tool; a cancelled
    /// turn leaves no trace in history or the store.
    pub async fn run_turn_with(
        &self,
        session: &mut ConversationSession,
        message: &str,
        stream: Option<&mpsc::Sender<AgentStreamEvent>>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let config = self.config.snapshot();
        let mode_name = session.mode().to_string();
        let mode = config.mode(&mode_name);
        let allowed = self.allowed_tools(&config, &mode_name, &mode);
        let route = RoutingPolicy::from_config(&config.router).decide(message, &mode_name, &allowed);
        let conversation_id = session.id().to_string();

        info!(
            conversation_id = %conversation_id,
            mode = %mode_name,
            routed_tool = ?route.tool_name,
            "Processing turn"
        );
        self.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            mode: mode_name.clone(),
            routed_tool: route.tool_name.clone(),
            timestamp: Utc::now(),
        });

        let contract = ReplyContract::for_turn(config.agent.reasoning_format, !allowed.is_empty());
        let definitions: Vec<ToolDefinition> = self
            .tools
            .definitions()
            .into_iter()
            .filter(|d| allowed.contains(&d.name))
            .collect();
        let system_prompt = build_system_prompt(
            contract,
            mode.system_prompt.as_deref(),
            &definitions,
            route.tool_name.as_deref(),
        );

        // BUILD_CONTEXT
        let user_turn = Turn::user(message);
        let mut window = session.context().recent(config.agent.history_window).to_vec();
        window.push(user_turn.clone());
        let mut base = vec![Turn::system(system_prompt)];
        base.extend(session.context().trim(&window));

        let plan = TurnPlan {
            contract,
            mode,
            model: config.model.model.clone(),
            code_tool: config.agent.code_tool.clone(),
            timeout: Duration::from_secs(config.agent.generation_timeout_secs.max(1)),
            stream: config.agent.stream,
            conversation_id: conversation_id.clone(),
        };
        let mut run = TurnRun {
            steps: StepLog::new(config.agent.observation_budget),
            artifacts: Vec::new(),
            scratch: Vec::new(),
            last_text: None,
            steps_taken: 0,
        };

        let ending = self.drive(&plan, &base, &allowed, &mut run, stream, cancel).await;

        if ending.status.is_committed() {
            let mut assistant = Turn::assistant(ending.reply.clone());
            if let Some(thought) = &ending.thought {
                assistant = assistant.with_meta("thought", thought.clone());
            }
            if !run.steps.is_empty() {
                assistant = assistant.with_meta("steps", run.steps.to_json());
            }
            session.commit(user_turn, assistant).await;
        }

        let tool_calls = run.steps.tool_calls();
        info!(
            conversation_id = %conversation_id,
            status = ending.status.as_str(),
            steps = run.steps_taken,
            tool_calls,
            "Turn finished"
        );
        self.publish(DomainEvent::TurnCompleted {
            conversation_id: conversation_id.clone(),
            status: ending.status.as_str().to_string(),
            steps: run.steps_taken,
            tool_calls,
            timestamp: Utc::now(),
        });
        emit(
            stream,
            AgentStreamEvent::Done {
                conversation_id,
                status: ending.status.as_str().to_string(),
                steps: run.steps_taken,
                tool_calls_made: tool_calls,
            },
        )
        .await;

        TurnOutcome {
            reply: ending.reply,
            thought: ending.thought,
            status: ending.status,
            steps: run.steps,
            artifacts: run.artifacts,
            route,
            steps_taken: run.steps_taken,
        }
    }

    /// Tools the model may call this turn: the mode's list, restricted to
    /// registered tools, and nothing at all outside tool-enabled modes.
    fn allowed_tools(&self, config: &AppConfig, mode_name: &str, mode: &ModeConfig) -> HashSet<String> {
        if !config.is_tool_enabled(mode_name) {
            return HashSet::new();
        }
        mode.allowed_tools
            .iter()
            .filter(|name| self.tools.contains(name))
            .cloned()
            .collect()
    }

    async fn drive(
        &self,
        plan: &TurnPlan,
        base: &[Turn],
        allowed: &HashSet<String>,
        run: &mut TurnRun,
        stream: Option<&mpsc::Sender<AgentStreamEvent>>,
        cancel: &CancellationToken,
    ) -> Ending {
        let max_steps = plan.mode.max_steps.max(1);

        for step in 1..=max_steps {
            if cancel.is_cancelled() {
                return Ending::new(TurnStatus::Cancelled, CANCELLED_REPLY);
            }
            run.steps_taken = step;
            debug!(conversation_id = %plan.conversation_id, step, "Agent loop step");

            let mut messages = base.to_vec();
            messages.extend(run.scratch.iter().cloned());

            let (decision, text) = match self.attempt_step(plan, messages, step, stream, cancel).await {
                Attempt::Decided { decision, text } => (decision, text),
                Attempt::Undecided => return Ending::new(TurnStatus::NoDecision, NO_DECISION_REPLY),
                Attempt::Unavailable { degraded } => return Ending::new(TurnStatus::ModelUnavailable, degraded),
                Attempt::Cancelled => return Ending::new(TurnStatus::Cancelled, CANCELLED_REPLY),
            };
            run.last_text = Some(text.clone());

            let thought = decision.thought().to_string();
            run.steps.record_thought(&thought);
            if !thought.trim().is_empty() {
                emit(stream, AgentStreamEvent::Thought { content: thought.clone() }).await;
            }

            match decision {
                Decision::Final { content, .. } => {
                    return Ending {
                        status: TurnStatus::Final,
                        reply: tidy(&content),
                        thought: (!thought.trim().is_empty()).then_some(thought),
                    };
                }
                Decision::Tool { tool, args, .. } => {
                    let observation = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Ending::new(TurnStatus::Cancelled, CANCELLED_REPLY);
                        }
                        observation = self.execute_tool(step, &tool, args.clone(), allowed, stream) => observation,
                    };
                    let (_, artifact) = split_artifact(&observation.text);
                    if let Some(path) = &artifact {
                        run.artifacts.push(path.clone());
                    }
                    run.steps.record_tool(&args, &observation);
                    emit(
                        stream,
                        AgentStreamEvent::ToolResult {
                            step,
                            name: tool.clone(),
                            output: observation.text.clone(),
                            success: observation.success,
                            artifact,
                        },
                    )
                    .await;

                    run.scratch.push(Turn::assistant(text));
                    run.scratch.push(Turn::user(format!("Observation: {}", observation.text)));
                }
            }
        }

        warn!(
            conversation_id = %plan.conversation_id,
            max_steps,
            "Step budget exhausted without a final answer"
        );
        let reply = run
            .last_text
            .as_deref()
            .map(tidy)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| BUDGET_REPLY.to_string());
        Ending::new(TurnStatus::BudgetExhausted, reply)
    }

    async fn execute_tool(
        &self,
        step: usize,
        tool: &str,
        args: ToolArgs,
        allowed: &HashSet<String>,
        stream: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> lokal_core::tool::Observation {
        emit(
            stream,
            AgentStreamEvent::ToolCall {
                step,
                name: tool.to_string(),
                input: serde_json::Value::Object(args.clone().adapt()),
            },
        )
        .await;
        debug!(tool = %tool, args = %args.display(), step, "Executing tool");

        let started = Instant::now();
        let observation = self.tools.execute(tool, args, Some(allowed)).await;
        self.publish(DomainEvent::ToolExecuted {
            tool_name: tool.to_string(),
            success: observation.success,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        observation
    }

    /// GENERATE and PARSE for one step, retrying output that does not parse.
    ///
    /// The first attempt asks the backend for structured output when the
    /// contract is JSON; later attempts relax that.
    async fn attempt_step(
        &self,
        plan: &TurnPlan,
        messages: Vec<Turn>,
        step: usize,
        stream: Option<&mpsc::Sender<AgentStreamEvent>>,
        cancel: &CancellationToken,
    ) -> Attempt {
        let attempts = plan.mode.retry_count.max(1);
        let mut degraded = None;
        let mut got_output = false;

        for attempt in 0..attempts {
            let request = ProviderRequest {
                model: plan.model.clone(),
                messages: messages.clone(),
                params: GenerationParams {
                    max_tokens: Some(plan.mode.max_tokens),
                    temperature: plan.mode.temperature,
                    top_p: Some(plan.mode.top_p),
                    stop: plan.mode.stop.clone(),
                    structured_output: plan.contract == ReplyContract::Json && attempt == 0,
                },
                stream: plan.stream && stream.is_some(),
            };
            // Chunks only make sense to a reader when the text is the answer
            let forward = stream.filter(|_| plan.contract == ReplyContract::Plain);

            let generated = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempt::Cancelled,
                result = self.generate(request, forward, plan.timeout) => result,
            };
            let raw = match generated {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(conversation_id = %plan.conversation_id, step, attempt, error = %e, "Model call failed");
                    let text = format!("[error contacting model: {e}]");
                    emit(stream, AgentStreamEvent::Error { message: text.clone() }).await;
                    degraded = Some(text);
                    continue;
                }
            };
            got_output = true;
            self.publish(DomainEvent::ResponseGenerated {
                conversation_id: plan.conversation_id.clone(),
                model: plan.model.clone(),
                step,
                chars: raw.chars().count(),
                timestamp: Utc::now(),
            });

            let clean = strip_markers(&raw);
            match read_decision(plan, &clean.text) {
                Reading::Decision(decision) => {
                    return Attempt::Decided {
                        decision: with_fallback_thought(decision, clean.thought),
                        text: clean.text,
                    };
                }
                Reading::Empty => {
                    warn!(step, "Model reply had neither a tool call nor an answer");
                    return Attempt::Undecided;
                }
                Reading::Unparsed => {
                    debug!(step, attempt, contract = plan.contract.as_str(), "Model reply did not parse");
                }
            }
        }

        match degraded {
            Some(degraded) if !got_output => Attempt::Unavailable { degraded },
            _ => Attempt::Undecided,
        }
    }

    /// One model call, bounded by `timeout`. Streamed deltas are forwarded
    /// as they arrive and the full text is returned at end of stream.
    async fn generate(
        &self,
        request: ProviderRequest,
        forward: Option<&mpsc::Sender<AgentStreamEvent>>,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let provider = Arc::clone(&self.provider);
        let call = async move {
            if !request.stream {
                return provider.complete(request).await.map(|r| r.content);
            }
            let mut rx = provider.stream(request).await?;
            let mut text = String::new();
            while let Some(chunk) = rx.recv().await {
                let chunk = chunk?;
                if let Some(delta) = chunk.content.filter(|c| !c.is_empty()) {
                    emit(forward, AgentStreamEvent::Chunk { content: delta.clone() }).await;
                    text.push_str(&delta);
                }
                if chunk.done {
                    break;
                }
            }
            Ok(text)
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!("no reply within {}s", timeout.as_secs()))),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

fn read_decision(plan: &TurnPlan, text: &str) -> Reading {
    match plan.contract {
        ReplyContract::Plain if text.is_empty() => Reading::Unparsed,
        ReplyContract::Plain => Reading::Decision(Decision::Final {
            content: text.to_string(),
            thought: String::new(),
        }),
        ReplyContract::React => match parse_react(text) {
            Decision::Final { content, .. } if content.is_empty() => Reading::Unparsed,
            decision => Reading::Decision(decision),
        },
        ReplyContract::Json => match parse_structured(text, &plan.code_tool) {
            Ok(parsed) => parsed.reply.into_decision().map_or(Reading::Empty, Reading::Decision),
            Err(_) => Reading::Unparsed,
        },
    }
}

/// Use reasoning found in `<think>` blocks when the decision has none.
fn with_fallback_thought(decision: Decision, fallback: Option<String>) -> Decision {
    let Some(fallback) = fallback.filter(|_| decision.thought().is_empty()) else {
        return decision;
    };
    match decision {
        Decision::Final { content, .. } => Decision::Final { content, thought: fallback },
        Decision::Tool { tool, args, .. } => Decision::Tool { tool, args, thought: fallback },
    }
}

async fn emit(stream: Option<&mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
    if let Some(tx) = stream {
        if tx.send(event).await.is_err() {
            debug!("Stream receiver dropped");
        }
    }
}
