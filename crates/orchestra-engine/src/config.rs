//! Engine configuration.
//!
//! Plain serde structs with sensible defaults, loadable from TOML.  No hot
//! reloading: the engine reads its configuration once at construction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tool-execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Total attempts per tool call (1 = no retries).
    pub max_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Context-compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Accumulated-token threshold that triggers compaction.
    pub token_threshold: u64,

    /// Instructions sent to the model when summarizing the history.
    pub instructions: String,

    /// Whether to append the current task list to the summary so task
    /// state survives compaction.
    pub include_tasks: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            token_threshold: 150_000,
            instructions: "Summarize this conversation so far, preserving key facts, \
                           decisions, tool results, and any unfinished work. Be factual \
                           and concise; the summary will replace the earlier messages."
                .to_string(),
            include_tasks: true,
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Turn-loop settings.
    pub agent: AgentConfig,

    /// Tool-execution settings.
    pub executor: ExecutorConfig,

    /// Compaction settings.
    pub compaction: CompactionConfig,
}

/// Turn-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum model-call turns per request.  Tracked per `ask()` call,
    /// independent of the session-level turn counter, so one pathological
    /// request cannot silently consume the whole session budget.
    pub max_turns: u32,

    /// Consecutive all-error tool batches tolerated before the loop tells
    /// the model to stop calling tools and explain the failures.
    pub max_consecutive_failures: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_consecutive_failures: 3,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config {
            reason: e.to_string(),
        })
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| EngineError::Config {
            reason: format!("{}: {e}", path.as_ref().display()),
        })?;
        Self::from_toml(&text)
    }
}
