//! Tool execution.
//!
//! The executor owns the tool registry and the pending-call queue.  Every
//! queued call flows through the same pipeline: cancellation pre-check,
//! registry lookup, permission gate, schema validation, then the retry
//! loop around the tool itself.  Failures at any stage become error-status
//! results for the model rather than engine errors; only infrastructure
//! faults (a broken store) escape as `Err`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use orchestra_core::{
    AgentEvent, Handover, PermissionStatus, Store, Subscriber, Tool, ToolCall, ToolDefinition,
    ToolError, ToolOutcome, ToolResult,
};

use crate::config::ExecutorConfig;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Registered {
    tool: Arc<dyn Tool>,
    schema: JSONSchema,
}

/// Executes model-requested tool calls against a registry of tools.
pub struct Executor {
    store: Arc<dyn Store>,
    config: ExecutorConfig,
    tools: HashMap<String, Registered>,
    queue: Mutex<VecDeque<ToolCall>>,
}

impl Executor {
    /// Create an executor with an empty registry.
    pub fn new(store: Arc<dyn Store>, config: ExecutorConfig) -> Self {
        Self {
            store,
            config,
            tools: HashMap::new(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a tool.  Names are matched case-insensitively, so two
    /// tools whose names differ only in case collide.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let key = tool.name().to_lowercase();
        if self.tools.contains_key(&key) {
            return Err(EngineError::DuplicateTool { name: key });
        }

        let schema_value = tool.input_schema();
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| EngineError::InvalidSchema {
                tool: key.clone(),
                reason: e.to_string(),
            })?;

        debug!(tool = %key, "tool registered");
        self.tools.insert(key, Registered { tool, schema });
        Ok(())
    }

    /// Definitions of every registered tool, for the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|r| r.tool.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Queue calls for the next [`Self::execute_tool_stack`].
    pub fn enqueue(&self, calls: Vec<ToolCall>) {
        self.queue().extend(calls);
    }

    /// Number of calls waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    // The queue holds plain call data, so a guard poisoned by a panicking
    // holder is reclaimed rather than propagated.
    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ToolCall>> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Drain the queue, executing calls in order.
    ///
    /// Each finished call is announced through `notify` before the next one
    /// starts.  An aborted result ends the batch early: remaining calls are
    /// discarded without results, so the model sees exactly where the
    /// cancellation landed.  The queue is left empty whatever happens; a
    /// call never survives into a later batch, where its result would pair
    /// with no tool call in that turn.
    pub async fn execute_tool_stack(
        &self,
        handover: Option<&dyn Handover>,
        notify: &dyn Subscriber,
        signal: Option<&CancellationToken>,
    ) -> Result<Vec<ToolResult>> {
        let outcome = self.drain(handover, notify, signal).await;
        self.queue().clear();
        outcome
    }

    async fn drain(
        &self,
        handover: Option<&dyn Handover>,
        notify: &dyn Subscriber,
        signal: Option<&CancellationToken>,
    ) -> Result<Vec<ToolResult>> {
        let mut results = Vec::new();

        loop {
            let call = match self.queue().pop_front() {
                Some(call) => call,
                None => break,
            };

            let result = self.execute_call(&call, handover, signal).await?;
            notify
                .record(&AgentEvent::ToolUseResult {
                    result: result.clone(),
                })
                .await;

            let aborted = result.is_aborted();
            results.push(result);
            if aborted {
                break;
            }
        }

        Ok(results)
    }

    /// Run a single call through the full pipeline.
    async fn execute_call(
        &self,
        call: &ToolCall,
        handover: Option<&dyn Handover>,
        signal: Option<&CancellationToken>,
    ) -> Result<ToolResult> {
        let registered = self.tools.get(&call.name.to_lowercase());
        let unabortable = registered.map_or(false, |r| r.tool.unabortable());

        // Pre-check: a call that has not started yet is simply not started,
        // unless the tool insists on running to completion.
        if signal.is_some_and(|s| s.is_cancelled()) && !unabortable {
            debug!(tool = %call.name, "call aborted before start");
            return Ok(ToolResult::new(
                call,
                ToolOutcome::aborted("cancelled before execution"),
            ));
        }

        let Some(registered) = registered else {
            warn!(tool = %call.name, "unknown tool requested");
            let mut known: Vec<&str> = self.tools.keys().map(String::as_str).collect();
            known.sort_unstable();
            return Ok(ToolResult::new(
                call,
                ToolOutcome::error(format!(
                    "unknown tool: {} (known tools: {})",
                    call.name,
                    known.join(", ")
                )),
            ));
        };
        let tool = &registered.tool;

        if tool.requires_permission() {
            match self.check_permission(tool.as_ref(), handover).await? {
                Ok(()) => {}
                Err(outcome) => return Ok(ToolResult::new(call, outcome)),
            }
        }

        if let Err(errors) = registered.schema.validate(&call.input) {
            let details: Vec<String> = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            debug!(tool = %call.name, "input failed schema validation");
            return Ok(ToolResult::new(
                call,
                ToolOutcome::error(format!(
                    "invalid input for {}: {}",
                    call.name,
                    details.join(", ")
                )),
            ));
        }

        Ok(self.run_with_retries(call, tool.as_ref(), handover, signal, unabortable).await)
    }

    /// The retry loop.  A tool `Err` is retried up to the configured attempt
    /// budget; an `Ok` outcome of any status is final.  Cancellation between
    /// or during attempts aborts the call unless the tool is unabortable.
    async fn run_with_retries(
        &self,
        call: &ToolCall,
        tool: &dyn Tool,
        handover: Option<&dyn Handover>,
        signal: Option<&CancellationToken>,
        unabortable: bool,
    ) -> ToolResult {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if signal.is_some_and(|s| s.is_cancelled()) && !unabortable {
                return ToolResult::new(call, ToolOutcome::aborted("cancelled between attempts"));
            }

            let run = tool.run(call.input.clone(), handover);
            let outcome = match (signal, unabortable) {
                (Some(signal), false) => {
                    tokio::select! {
                        _ = signal.cancelled() => {
                            debug!(tool = %call.name, attempt, "call aborted mid-flight");
                            return ToolResult::new(
                                call,
                                ToolOutcome::aborted("cancelled during execution"),
                            );
                        }
                        outcome = run => outcome,
                    }
                }
                _ => run.await,
            };

            match outcome {
                Ok(outcome) => return ToolResult::new(call, outcome),
                Err(ToolError::Cancelled) => {
                    return ToolResult::new(
                        call,
                        ToolOutcome::aborted("cancelled during execution"),
                    );
                }
                Err(ToolError::Failed { reason }) => {
                    if attempt >= max_attempts {
                        warn!(tool = %call.name, attempts = max_attempts, %reason, "tool failed, retries exhausted");
                        return ToolResult::new(
                            call,
                            ToolOutcome::error(format!(
                                "{} failed after {max_attempts} attempts: {reason}",
                                call.name
                            )),
                        );
                    }
                    warn!(tool = %call.name, attempt, %reason, "tool attempt failed, retrying");
                }
            }
        }

        unreachable!("retry loop always returns within the attempt budget")
    }

    // -----------------------------------------------------------------------
    // Permission gate
    // -----------------------------------------------------------------------

    /// Resolve the permission gate for a tool.  The outer `Result` carries
    /// store failures; the inner one is `Err(outcome)` when the call must
    /// not run.
    async fn check_permission(
        &self,
        tool: &dyn Tool,
        handover: Option<&dyn Handover>,
    ) -> Result<std::result::Result<(), ToolOutcome>> {
        let name = tool.name();
        match self.store.permission(name).await? {
            PermissionStatus::Granted => Ok(Ok(())),
            PermissionStatus::Denied => {
                debug!(tool = %name, "permission denied");
                Ok(Err(ToolOutcome::error(format!(
                    "permission denied for tool: {name}"
                ))))
            }
            PermissionStatus::Unset => match handover {
                Some(handover) => {
                    let payload = json!({
                        "type": "permission_request",
                        "tool": name,
                        "description": tool.description(),
                    });
                    match handover.request(payload).await {
                        Ok(response) if approved(&response) => {
                            self.store
                                .set_permission(name, PermissionStatus::Granted)
                                .await?;
                            debug!(tool = %name, "permission granted by user");
                            Ok(Ok(()))
                        }
                        Ok(_) => {
                            self.store
                                .set_permission(name, PermissionStatus::Denied)
                                .await?;
                            debug!(tool = %name, "permission denied by user");
                            Ok(Err(ToolOutcome::error(format!(
                                "permission denied for tool: {name}"
                            ))))
                        }
                        Err(ToolError::Cancelled) => {
                            Ok(Err(ToolOutcome::aborted("permission prompt cancelled")))
                        }
                        Err(ToolError::Failed { reason }) => Ok(Err(ToolOutcome::error(
                            format!("permission prompt failed: {reason}"),
                        ))),
                    }
                }
                // No way to ask: run rather than dead-end the turn.  The
                // grant is not persisted, so a later session with a
                // handover still prompts.
                None => {
                    warn!(tool = %name, "permission unset and no handover available, proceeding");
                    Ok(Ok(()))
                }
            },
        }
    }
}

/// Whether a handover response counts as approval.
fn approved(response: &Value) -> bool {
    match response {
        Value::Bool(b) => *b,
        Value::Object(map) => map
            .get("approved")
            .or_else(|| map.get("granted"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
