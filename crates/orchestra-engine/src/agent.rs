//! The turn loop.
//!
//! [`Agent`] drives one session: it appends the user's request to the
//! context, calls the model, executes any requested tools, feeds results
//! back, and repeats until the model answers in plain text or a limit is
//! hit.  The loop enforces the per-request turn budget, the
//! consecutive-failure circuit breaker, and the compaction check that runs
//! after every tool batch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orchestra_core::{
    AgentEvent, Handover, Message, Model, Store, Subscriber, TaskStatus, Tool,
};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::executor::Executor;
use crate::observer::Observer;
use crate::prompt::PromptMachine;

// ---------------------------------------------------------------------------
// Setup and reply types
// ---------------------------------------------------------------------------

/// Everything needed to construct an [`Agent`].
pub struct AgentSetup {
    /// Session persistence backend.
    pub store: Arc<dyn Store>,

    /// Model backend.
    pub model: Arc<dyn Model>,

    /// System prompt for every model call, when one applies.
    pub system_prompt: Option<String>,

    /// Engine settings.
    pub config: EngineConfig,

    /// Tools available to the model.
    pub tools: Vec<Arc<dyn Tool>>,

    /// Event subscribers, attached before the first turn.
    pub subscribers: Vec<Arc<dyn Subscriber>>,
}

/// Why a request finished.
///
/// Cancellation is not a stop reason: a cancelled request surfaces as
/// [`EngineError::Cancelled`], with everything appended so far kept in the
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered in plain text.
    Completed,
    /// The per-request turn budget ran out.
    TurnLimit,
}

/// The outcome of one [`Agent::ask`] call.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// The model's final text, possibly empty when the loop stopped early.
    pub text: String,

    /// Why the loop stopped.
    pub stop_reason: StopReason,

    /// Model-call turns this request consumed.
    pub turns: u32,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Orchestrates one session's conversation loop.
pub struct Agent {
    context: Context,
    prompt: PromptMachine,
    executor: Executor,
    observer: Observer,
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl Agent {
    /// Build an agent from its setup.  Fails if two tools collide on a
    /// case-insensitive name or a tool's input schema does not compile.
    pub fn new(setup: AgentSetup) -> Result<Self> {
        let prompt = PromptMachine::new(setup.model, setup.system_prompt);
        for subscriber in setup.subscribers {
            prompt.subscribe(subscriber);
        }

        let mut executor = Executor::new(Arc::clone(&setup.store), setup.config.executor.clone());
        for tool in setup.tools {
            executor.register(tool)?;
        }

        Ok(Self {
            context: Context::new(Arc::clone(&setup.store)),
            prompt,
            executor,
            observer: Observer::new(Arc::clone(&setup.store), setup.config.compaction.clone()),
            store: setup.store,
            config: setup.config,
        })
    }

    /// The context layer, for inspection (visible window, full history).
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Attach an event subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> u64 {
        self.prompt.subscribe(subscriber)
    }

    /// Run one request to completion.
    ///
    /// `handover`, when present, lets permission prompts and tool
    /// elicitation reach the human side for the duration of this request.
    /// The turn budget is counted per call, so a long-lived session's
    /// accumulated turn counter never starves a fresh request.
    pub async fn ask(
        &self,
        text: impl Into<String>,
        handover: Option<&dyn Handover>,
        signal: Option<&CancellationToken>,
    ) -> Result<AgentReply> {
        self.context.append(vec![Message::user(text)]).await?;

        let max_turns = self.config.agent.max_turns.max(1);
        let mut turns: u32 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            if signal.is_some_and(|s| s.is_cancelled()) {
                return Err(EngineError::Cancelled);
            }
            if turns >= max_turns {
                warn!(turns, "turn budget exhausted");
                let text = format!("Stopped after reaching the {max_turns}-turn limit.");
                // The stop is part of the conversation, not an error.
                self.context.append(vec![Message::agent(text.clone())]).await?;
                return Ok(AgentReply {
                    text,
                    stop_reason: StopReason::TurnLimit,
                    turns,
                });
            }

            let window = self.context.messages().await?;
            let output = self
                .prompt
                .prompt(window, self.executor.definitions(), signal)
                .await?;
            turns += 1;
            self.store.increment_turn().await?;
            self.observer
                .record_usage(output.tokens_in, output.tokens_out)
                .await?;

            let calls = output.tool_calls();
            let text = output.text();
            self.context.append(output.messages).await?;

            if calls.is_empty() {
                self.complete_in_progress_tasks().await?;
                info!(turns, "request complete");
                return Ok(AgentReply {
                    text,
                    stop_reason: StopReason::Completed,
                    turns,
                });
            }

            debug!(count = calls.len(), "executing tool batch");
            self.executor.enqueue(calls);
            let results = self
                .executor
                .execute_tool_stack(handover, &EventSink(&self.prompt), signal)
                .await?;

            let aborted = results.iter().any(|r| r.is_aborted());
            let all_failed = !results.is_empty() && results.iter().all(|r| r.is_error());

            // Results reach the context before anything else can touch the
            // window, so a compaction never sees an unanswered tool call.
            self.context
                .append(vec![Message::tool_results(results)])
                .await?;

            // An aborted result means cancellation landed mid-batch.  The
            // appended history stays as-is; the caller gets the error.
            if aborted {
                info!(turns, "request cancelled mid-batch");
                return Err(EngineError::Cancelled);
            }

            if all_failed {
                consecutive_failures += 1;
                if consecutive_failures >= self.config.agent.max_consecutive_failures {
                    warn!(consecutive_failures, "tool failure streak, breaking the loop");
                    self.context
                        .append(vec![Message::user(
                            "Your recent tool calls all failed. Stop calling tools and \
                             explain the problem to the user instead.",
                        )])
                        .await?;
                    consecutive_failures = 0;
                }
            } else {
                consecutive_failures = 0;
            }

            self.observer
                .maybe_compact(&self.context, &self.prompt, signal)
                .await?;
        }
    }

    /// A turn that ends without tool calls closes out whatever was being
    /// worked on.
    async fn complete_in_progress_tasks(&self) -> Result<()> {
        for task in self.store.tasks().await? {
            if task.status == TaskStatus::InProgress {
                debug!(task = %task.id, "auto-completing task");
                self.store
                    .update_task(&task.id, TaskStatus::Completed)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Routes executor events through the prompt machine's subscriber list.
struct EventSink<'a>(&'a PromptMachine);

#[async_trait]
impl Subscriber for EventSink<'_> {
    async fn record(&self, event: &AgentEvent) {
        self.0.notify(event).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
