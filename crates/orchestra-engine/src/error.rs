//! Engine error types.
//!
//! Most failures in the orchestration loop are deliberately *not* errors:
//! unknown tools, validation failures, permission denials, and exhausted
//! retries all become error-status tool results, and turn-limit exhaustion
//! becomes a terminal message.  [`EngineError`] covers what remains --
//! infrastructure failures and cancellation observed at the loop boundary.

use orchestra_core::{ModelError, StoreError};

/// Unified error type for the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request was cancelled before or between loop steps.
    #[error("request cancelled")]
    Cancelled,

    /// A tool name was registered twice.
    #[error("tool already registered: {name}")]
    DuplicateTool {
        /// The conflicting (normalized) name.
        name: String,
    },

    /// A tool's input schema failed to compile at registration time.
    #[error("invalid input schema for tool {tool}: {reason}")]
    InvalidSchema {
        /// The tool whose schema was rejected.
        tool: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// A blocking display slot was rejected by the UI.
    #[error("display slot {id} rejected: {reason}")]
    SlotRejected {
        /// The slot id.
        id: u64,
        /// Rejection reason supplied by the resolver.
        reason: String,
    },

    /// A blocking display slot was force-removed while a waiter was
    /// still pending.
    #[error("display slot {id} closed before resolution")]
    SlotClosed {
        /// The slot id.
        id: u64,
    },

    /// Configuration could not be parsed.
    #[error("config error: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },

    /// An error propagated from the store backend.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An error propagated from the model backend.
    #[error("model error: {0}")]
    Model(ModelError),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            // Cancellation keeps its identity across the boundary.
            ModelError::Cancelled => Self::Cancelled,
            other => Self::Model(other),
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;
