//! The persistence contract.
//!
//! A [`Store`] persists one session's messages, usage counters, tasks, and
//! per-tool permissions.  Write discipline is part of the contract: only
//! the engine's context layer calls the message-mutating operations, and
//! only the context/compaction layers touch the counters.  Stores never
//! interpret message content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::message::Message;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Lifecycle of a user-visible task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet started.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Finished.
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// A user-visible unit of work, surfaced in the UI and mutated by tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (UUID v7).
    pub id: String,

    /// Imperative description ("Fix the login bug").
    pub imperative: String,

    /// Continuous-form description ("Fixing the login bug").
    pub continuous: String,

    /// Current status.
    pub status: TaskStatus,
}

impl Task {
    /// Create a new pending task.
    pub fn new(imperative: impl Into<String>, continuous: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            imperative: imperative.into(),
            continuous: continuous.into(),
            status: TaskStatus::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Persisted permission state for one tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    /// The user approved this tool.
    Granted,
    /// The user denied this tool.
    Denied,
    /// Never asked.
    Unset,
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Persistence backend for one session.
#[async_trait]
pub trait Store: Send + Sync {
    // -- messages ------------------------------------------------------------

    /// Full stored message history, oldest first.
    async fn messages(&self) -> StoreResult<Vec<Message>>;

    /// Append messages to the history in order.
    async fn append_messages(&self, messages: Vec<Message>) -> StoreResult<()>;

    /// Replace the most recent stored message (merge support).  Errors if
    /// the history is empty.
    async fn update_last_message(&self, message: Message) -> StoreResult<()>;

    // -- counters ------------------------------------------------------------

    /// Accumulated token usage since the last counter reset.
    async fn token_count(&self) -> StoreResult<u64>;

    /// Add to the accumulated token usage.
    async fn add_tokens(&self, tokens: u64) -> StoreResult<()>;

    /// Number of turns since the last counter reset.
    async fn turn_count(&self) -> StoreResult<u64>;

    /// Record one completed turn.
    async fn increment_turn(&self) -> StoreResult<()>;

    /// Reset token and turn counters to zero.
    async fn reset_counters(&self) -> StoreResult<()>;

    // -- tasks ---------------------------------------------------------------

    /// All tasks, in creation order.
    async fn tasks(&self) -> StoreResult<Vec<Task>>;

    /// Add tasks.
    async fn add_tasks(&self, tasks: Vec<Task>) -> StoreResult<()>;

    /// Update one task's status.
    async fn update_task(&self, id: &str, status: TaskStatus) -> StoreResult<()>;

    // -- permissions ---------------------------------------------------------

    /// Permission status for a tool name.  Unknown names are
    /// [`PermissionStatus::Unset`].
    async fn permission(&self, tool: &str) -> StoreResult<PermissionStatus>;

    /// Persist the permission status for a tool name.
    async fn set_permission(&self, tool: &str, status: PermissionStatus) -> StoreResult<()>;
}
