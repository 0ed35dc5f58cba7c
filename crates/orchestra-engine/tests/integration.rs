//! Integration tests for the orchestra-engine crate.
//!
//! These tests drive full request loops (model, tools, store) against a
//! scripted model backend and a real SQLite-backed store, without a live
//! model connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use orchestra_core::{
    AgentEvent, Handover, Message, Model, ModelOutput, ModelResult, PermissionStatus,
    PromptRequest, Sender, Store, Subscriber, Tool, ToolCall, ToolOutcome, ToolResultOf,
};
use orchestra_engine::{Agent, AgentConfig, AgentSetup, CompactionConfig, EngineConfig, StopReason};
use orchestra_store::SqliteStore;

// ═══════════════════════════════════════════════════════════════════════
//  Test doubles
// ═══════════════════════════════════════════════════════════════════════

/// Plays back scripted outputs, then answers "done" forever.
struct ScriptModel {
    script: Mutex<VecDeque<ModelOutput>>,
}

impl ScriptModel {
    fn new(outputs: Vec<ModelOutput>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outputs.into()),
        })
    }
}

#[async_trait]
impl Model for ScriptModel {
    async fn prompt(
        &self,
        _request: PromptRequest,
        _notify: &dyn Subscriber,
        _signal: Option<&CancellationToken>,
    ) -> ModelResult<ModelOutput> {
        Ok(self.script.lock().unwrap().pop_front().unwrap_or(ModelOutput {
            messages: vec![Message::agent("done")],
            tokens_in: 10,
            tokens_out: 10,
        }))
    }
}

fn tool_call_output(name: &str, input: Value) -> ModelOutput {
    ModelOutput {
        messages: vec![Message::agent_with_tool_calls(
            "",
            vec![ToolCall {
                id: Some("tc_1".into()),
                name: name.into(),
                input,
            }],
        )],
        tokens_in: 10,
        tokens_out: 10,
    }
}

struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes its input back"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn run(
        &self,
        input: Value,
        _handover: Option<&dyn Handover>,
    ) -> ToolResultOf<ToolOutcome> {
        Ok(ToolOutcome::success(input))
    }
}

struct Gated {
    runs: AtomicU32,
}

#[async_trait]
impl Tool for Gated {
    fn name(&self) -> &str {
        "gated"
    }
    fn description(&self) -> &str {
        "Requires permission"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn requires_permission(&self) -> bool {
        true
    }
    async fn run(
        &self,
        _input: Value,
        _handover: Option<&dyn Handover>,
    ) -> ToolResultOf<ToolOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(ToolOutcome::success(json!("ran")))
    }
}

/// Approves every request and counts how often it was asked.
struct CountingHandover {
    asked: AtomicU32,
}

#[async_trait]
impl Handover for CountingHandover {
    async fn request(&self, _payload: Value) -> ToolResultOf<Value> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"approved": true}))
    }
}

/// Collects every tool-result event it sees.
#[derive(Default)]
struct ResultRecorder {
    results: Mutex<Vec<orchestra_core::ToolResult>>,
}

#[async_trait]
impl Subscriber for ResultRecorder {
    async fn record(&self, event: &AgentEvent) {
        if let AgentEvent::ToolUseResult { result } = event {
            self.results.lock().unwrap().push(result.clone());
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn assert_alternating(messages: &[Message]) {
    for pair in messages.windows(2) {
        assert_ne!(
            pair[0].sender, pair[1].sender,
            "adjacent messages share a sender"
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Full request loops over SQLite
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn echo_round_trip_persists_an_alternating_history() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let model = ScriptModel::new(vec![tool_call_output("echo", json!({"n": 7}))]);
    let recorder = Arc::new(ResultRecorder::default());

    let agent = Agent::new(AgentSetup {
        store: Arc::clone(&store) as Arc<dyn Store>,
        model,
        system_prompt: Some("be helpful".into()),
        config: EngineConfig::default(),
        tools: vec![Arc::new(Echo)],
        subscribers: vec![Arc::clone(&recorder) as Arc<dyn Subscriber>],
    })
    .unwrap();

    let reply = agent.ask("echo seven", None, None).await.unwrap();
    assert_eq!(reply.stop_reason, StopReason::Completed);
    assert_eq!(reply.text, "done");
    assert_eq!(reply.turns, 2);

    let history = store.messages().await.unwrap();
    assert_alternating(&history);
    assert_eq!(history[0].sender, Sender::User);

    let results: Vec<_> = history.iter().flat_map(|m| m.tool_results.iter()).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome.data, json!({"n": 7}));

    // Exactly one result notification reached the subscribers.
    let seen = recorder.results.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].outcome.data, json!({"n": 7}));
    drop(seen);

    // Two model calls at 20 tokens each.
    assert_eq!(store.token_count().await.unwrap(), 40);
    assert_eq!(store.turn_count().await.unwrap(), 2);
}

#[tokio::test]
async fn crossing_the_token_threshold_compacts_the_window() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let model = ScriptModel::new(vec![
        tool_call_output("echo", json!({})),
        ModelOutput {
            messages: vec![Message::agent("summary of everything so far")],
            tokens_in: 3,
            tokens_out: 2,
        },
        // The post-compaction final answer.
        ModelOutput {
            messages: vec![Message::agent("all wrapped up")],
            tokens_in: 10,
            tokens_out: 10,
        },
    ]);

    let agent = Agent::new(AgentSetup {
        store: Arc::clone(&store) as Arc<dyn Store>,
        model,
        system_prompt: None,
        config: EngineConfig {
            compaction: CompactionConfig {
                token_threshold: 15,
                include_tasks: false,
                ..CompactionConfig::default()
            },
            ..EngineConfig::default()
        },
        tools: vec![Arc::new(Echo)],
        subscribers: vec![],
    })
    .unwrap();

    let reply = agent.ask("do a lot of work", None, None).await.unwrap();
    assert_eq!(reply.stop_reason, StopReason::Completed);
    assert_eq!(reply.text, "all wrapped up");

    // The visible window starts at the summary; the raw history keeps
    // everything that came before it.
    let window = agent.context().messages().await.unwrap();
    assert!(window[0].compaction);
    assert!(window[0].text.starts_with("summary of everything so far"));
    assert_alternating(&window);

    let full = store.messages().await.unwrap();
    assert!(full.len() > window.len());
    assert!(full.iter().any(|m| m.text == "do a lot of work"));

    // Counter was reset at compaction, then accumulated the compaction
    // call (5) and the final turn (20).
    assert_eq!(store.token_count().await.unwrap(), 25);
}

#[tokio::test]
async fn granted_permission_is_asked_once_and_remembered() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let model = ScriptModel::new(vec![
        tool_call_output("gated", json!({})),
        ModelOutput {
            messages: vec![Message::agent("first done")],
            tokens_in: 1,
            tokens_out: 1,
        },
        tool_call_output("gated", json!({})),
    ]);
    let gated = Arc::new(Gated {
        runs: AtomicU32::new(0),
    });
    let handover = Arc::new(CountingHandover {
        asked: AtomicU32::new(0),
    });

    let agent = Agent::new(AgentSetup {
        store: Arc::clone(&store) as Arc<dyn Store>,
        model,
        system_prompt: None,
        config: EngineConfig::default(),
        tools: vec![Arc::clone(&gated) as Arc<dyn Tool>],
        subscribers: vec![],
    })
    .unwrap();

    agent
        .ask("use the gated tool", Some(handover.as_ref()), None)
        .await
        .unwrap();
    agent
        .ask("use it again", Some(handover.as_ref()), None)
        .await
        .unwrap();

    // Two runs, but only one prompt: the grant was persisted.
    assert_eq!(gated.runs.load(Ordering::SeqCst), 2);
    assert_eq!(handover.asked.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.permission("gated").await.unwrap(),
        PermissionStatus::Granted
    );
}

#[tokio::test]
async fn turn_budget_holds_per_request_not_per_session() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());

    // First request burns two turns; with a budget of three, the second
    // request must still complete even though the session total passes it.
    let model = ScriptModel::new(vec![
        tool_call_output("echo", json!({})),
        ModelOutput {
            messages: vec![Message::agent("first")],
            tokens_in: 1,
            tokens_out: 1,
        },
        tool_call_output("echo", json!({})),
        ModelOutput {
            messages: vec![Message::agent("second")],
            tokens_in: 1,
            tokens_out: 1,
        },
    ]);

    let agent = Agent::new(AgentSetup {
        store: Arc::clone(&store) as Arc<dyn Store>,
        model,
        system_prompt: None,
        config: EngineConfig {
            agent: AgentConfig {
                max_turns: 3,
                ..AgentConfig::default()
            },
            ..EngineConfig::default()
        },
        tools: vec![Arc::new(Echo)],
        subscribers: vec![],
    })
    .unwrap();

    let first = agent.ask("one", None, None).await.unwrap();
    assert_eq!(first.stop_reason, StopReason::Completed);

    let second = agent.ask("two", None, None).await.unwrap();
    assert_eq!(second.stop_reason, StopReason::Completed);
    assert_eq!(second.text, "second");

    assert_eq!(store.turn_count().await.unwrap(), 4);
}
