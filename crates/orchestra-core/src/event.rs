//! Streaming events and the subscriber sink.
//!
//! Model backends and the tool executor both report progress through the
//! same [`Subscriber`] interface.  Events are delivered in emission order
//! and each subscriber is awaited before the next event proceeds, so a slow
//! subscriber applies back-pressure instead of dropping events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, ToolResult};

/// An event emitted while a turn is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental generated text.
    TextDelta {
        /// The text fragment.
        text: String,
    },

    /// The model requested a tool invocation.
    ToolUse {
        /// Correlation id for the eventual result, when the model issues one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Tool name.
        name: String,
        /// Raw input payload.
        input: Value,
    },

    /// One tool invocation finished (success, error, or aborted).
    ToolUseResult {
        /// The result that was just produced.
        result: ToolResult,
    },

    /// The model finished responding for this call.
    ModelResponseComplete {
        /// Messages produced by the model.
        messages: Vec<Message>,
        /// Prompt tokens consumed.
        tokens_in: u64,
        /// Generated tokens.
        tokens_out: u64,
    },
}

impl AgentEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolUseResult { .. } => "tool_use_result",
            Self::ModelResponseComplete { .. } => "model_response_complete",
        }
    }
}

/// A sink for in-flight turn events.
///
/// Implementations must tolerate events arriving from any component of the
/// engine; ordering within one turn is guaranteed, interleaving across
/// sessions is not.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Record one event.  Awaited to completion before the next event of
    /// the same turn is delivered.
    async fn record(&self, event: &AgentEvent);
}
