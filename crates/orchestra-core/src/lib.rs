//! Shared data model and external contracts for the Orchestra agent engine.
//!
//! This crate defines the types that flow through the orchestration loop
//! and the traits at its seams:
//!
//! - [`message`] -- conversation messages, content parts, tool calls and
//!   result envelopes.
//! - [`tool`] -- the [`Tool`] capability trait and the [`Handover`]
//!   human-input callback.
//! - [`model`] -- the [`Model`] backend contract.
//! - [`store`] -- the [`Store`] persistence contract, tasks, permissions.
//! - [`event`] -- streaming [`AgentEvent`]s and the [`Subscriber`] sink.
//! - [`error`] -- per-contract error enums.
//!
//! The engine crate (`orchestra-engine`) consumes these; concrete backends
//! (`orchestra-store`, model providers, UI layers) implement them.

pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod store;
pub mod tool;

// Re-export the most commonly used types at the crate root.
pub use error::{ModelError, ModelResult, StoreError, StoreResult, ToolError, ToolResultOf};
pub use event::{AgentEvent, Subscriber};
pub use message::{
    ContentPart, MediaSource, Message, Sender, ToolCall, ToolOutcome, ToolResult, ToolStatus,
};
pub use model::{Model, ModelOutput, PromptRequest};
pub use store::{PermissionStatus, Store, Task, TaskStatus};
pub use tool::{Handover, Tool, ToolDefinition};
