//! Context compaction.
//!
//! The observer watches the session's accumulated token counter and, once
//! it crosses the configured threshold, folds the visible window into a
//! single summary message.  The summary becomes the new start of context;
//! earlier messages stay in the store but leave the model's view.
//!
//! Compaction runs between turns, always after a tool batch's results have
//! been appended, so the summarized window never contains a tool call
//! whose result is still pending.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use orchestra_core::{Message, Store, TaskStatus};

use crate::config::CompactionConfig;
use crate::context::Context;
use crate::error::Result;
use crate::prompt::PromptMachine;

/// Watches token usage and compacts the context when it grows too large.
pub struct Observer {
    store: Arc<dyn Store>,
    config: CompactionConfig,
}

impl Observer {
    /// Create an observer over a store.
    pub fn new(store: Arc<dyn Store>, config: CompactionConfig) -> Self {
        Self { store, config }
    }

    /// Record one model call's token usage against the session counter.
    pub async fn record_usage(&self, tokens_in: u64, tokens_out: u64) -> Result<()> {
        self.store.add_tokens(tokens_in + tokens_out).await?;
        Ok(())
    }

    /// Compact the context if the token counter has crossed the threshold.
    ///
    /// Returns whether a compaction happened.  The summarization call runs
    /// without tools; its own usage is what the counter holds afterwards,
    /// so back-to-back compactions cannot trigger off a stale count.
    pub async fn maybe_compact(
        &self,
        context: &Context,
        prompt: &PromptMachine,
        signal: Option<&CancellationToken>,
    ) -> Result<bool> {
        let tokens = self.store.token_count().await?;
        if tokens < self.config.token_threshold {
            return Ok(false);
        }

        let window = context.messages().await?;
        if window.is_empty() {
            return Ok(false);
        }

        debug!(tokens, threshold = self.config.token_threshold, "compaction triggered");

        let mut request = window;
        request.push(Message::user(self.config.instructions.clone()));

        let output = prompt.prompt(request, Vec::new(), signal).await?;

        let mut summary = output.text();
        if self.config.include_tasks {
            if let Some(block) = self.task_block().await? {
                summary.push_str("\n\n");
                summary.push_str(&block);
            }
        }
        summary.push_str(CONTINUATION_MARKER);

        context
            .replace_with_summary(Message::summary(summary))
            .await?;

        self.store.reset_counters().await?;
        self.store
            .add_tokens(output.tokens_in + output.tokens_out)
            .await?;

        info!(
            tokens_before = tokens,
            tokens_after = output.tokens_in + output.tokens_out,
            "context compacted"
        );
        Ok(true)
    }

    /// The serialized task-list block carried inside the summary message,
    /// so in-flight work survives the boundary.  `None` when every task is
    /// already done.
    async fn task_block(&self) -> Result<Option<String>> {
        let tasks = self.store.tasks().await?;
        let open: Vec<String> = tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .map(|t| format!("[{}] {}", t.status, t.imperative))
            .collect();
        if open.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("Current tasks:\n{}", open.join("\n"))))
    }
}

/// Appended to every summary so the model knows the conversation resumes
/// from a condensed state.
const CONTINUATION_MARKER: &str =
    "\n\nThe conversation continues from this summary.";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
