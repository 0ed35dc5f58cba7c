//! The tool contract.
//!
//! A tool is a named, described, schema-validated capability the model may
//! invoke.  Tools run inside the executor, which validates input against
//! [`Tool::input_schema`] before calling [`Tool::run`] and translates every
//! failure into a result envelope for the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolResultOf;
use crate::message::ToolOutcome;

/// What the model is shown about an available tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input payload.
    pub input_schema: Value,
}

/// A callback a tool uses to request ad hoc human input mid-execution.
///
/// The executor also uses it for permission prompts when a gated tool's
/// permission status is unset.  The payload and response shapes are opaque
/// to the engine.
#[async_trait]
pub trait Handover: Send + Sync {
    /// Ask the human side for input; resolves when a response arrives.
    async fn request(&self, payload: Value) -> ToolResultOf<Value>;
}

/// A capability the model may invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.  Matched case-insensitively.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the input payload.  [`Tool::run`] is never invoked
    /// with input that fails validation against this schema.
    fn input_schema(&self) -> Value;

    /// Whether execution requires a persisted per-tool permission grant.
    fn requires_permission(&self) -> bool {
        false
    }

    /// Whether this tool must run to completion even under an active
    /// cancellation signal.  Reserved for operations that must not be left
    /// half-committed (e.g. a submitted checkout form); such tools also
    /// keep their retries while the signal is active.
    fn unabortable(&self) -> bool {
        false
    }

    /// Execute with validated input.  `handover`, when present, lets the
    /// tool pause and collect structured human input.
    async fn run(&self, input: Value, handover: Option<&dyn Handover>)
    -> ToolResultOf<ToolOutcome>;

    /// The definition advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}
