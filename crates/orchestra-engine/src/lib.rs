//! Agent orchestration engine.
//!
//! Ties a model backend, a tool registry, and a persistence store into a
//! conversation loop:
//!
//! - [`Agent`] drives the turn loop until the model answers in plain text.
//! - [`Executor`] validates, permission-gates, retries, and cancels tool
//!   calls.
//! - [`Context`] owns the message history and its merge and windowing
//!   rules.
//! - [`Observer`] compacts the context when token usage crosses the
//!   configured threshold.
//! - [`PromptMachine`] wraps the model with the system prompt and event
//!   fan-out.
//! - [`DisplayManager`] runs the interactive display-slot stack for tools
//!   that need structured human input.
//!
//! The contracts these components program against (messages, tools,
//! models, stores) live in `orchestra-core`; concrete store backends live
//! in `orchestra-store`.

pub mod agent;
pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod executor;
pub mod observer;
pub mod prompt;

pub use agent::{Agent, AgentReply, AgentSetup, StopReason};
pub use config::{AgentConfig, CompactionConfig, EngineConfig, ExecutorConfig};
pub use context::Context;
pub use display::{DisplayManager, RendererDescriptor, Slot, SlotRequest, StackListener};
pub use error::{EngineError, Result};
pub use executor::Executor;
pub use observer::Observer;
pub use prompt::PromptMachine;
