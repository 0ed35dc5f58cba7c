//! Error types for the external contracts.
//!
//! Each contract surfaces its own `thiserror` enum so backends can report
//! failures without committing to a concrete implementation's error type.
//! The engine crate wraps these with `#[from]`.

/// Errors produced by [`crate::Store`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("task", "message", ...).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The backing store failed (I/O, SQL, network, ...).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored document could not be (de)serialized.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors produced by [`crate::Model`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The request to the model backend failed.
    #[error("model request failed: {reason}")]
    RequestFailed {
        /// Backend-supplied failure description.
        reason: String,
    },

    /// The backend's response could not be interpreted.
    #[error("model response parse error: {reason}")]
    ParseFailed {
        /// What was malformed.
        reason: String,
    },

    /// The call was cancelled before a response was produced.
    #[error("model call cancelled")]
    Cancelled,
}

/// Convenience alias for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors a [`crate::Tool`] run function may raise.
///
/// Tool failures are recoverable by design: the executor translates them
/// into error results for the model rather than propagating them upward.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool observed the cancellation signal and stopped early.
    #[error("tool cancelled")]
    Cancelled,

    /// The tool failed; the executor may retry.
    #[error("tool failed: {reason}")]
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

impl ToolError {
    /// Shorthand for a [`ToolError::Failed`] with a formatted reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Convenience alias for tool run functions.
pub type ToolResultOf<T> = std::result::Result<T, ToolError>;
