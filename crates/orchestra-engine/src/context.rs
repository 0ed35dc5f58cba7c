//! Message-history ownership.
//!
//! [`Context`] is the only component that calls the store's
//! message-mutating operations.  It guarantees two things on top of the
//! raw log:
//!
//! 1. **Role alternation** -- appending never leaves two adjacent messages
//!    with the same sender; same-sender neighbours are merged instead.
//! 2. **Compaction windowing** -- the visible window starts at the most
//!    recent compaction-boundary message.  Pre-compaction history is
//!    logically retired but physically retained for audit and replay.

use std::sync::Arc;

use tracing::debug;

use orchestra_core::{Message, Store};

use crate::error::Result;

/// Owns read/modify access to one session's message history.
pub struct Context {
    store: Arc<dyn Store>,
}

impl Context {
    /// Create a context over a store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append messages, merging across same-sender boundaries.
    ///
    /// The incoming batch is first normalized (adjacent same-sender entries
    /// within it are merged), then the first entry is merged into the last
    /// stored message if the senders match.  An empty batch is a no-op.
    pub async fn append(&self, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut batch = normalize(messages);

        let stored = self.store.messages().await?;
        if let Some(last) = stored.last() {
            if last.sender == batch[0].sender {
                let merged = last.clone().merge(batch.remove(0));
                debug!(sender = ?merged.sender, "merged append into last stored message");
                self.store.update_last_message(merged).await?;
            }
        }

        if !batch.is_empty() {
            self.store.append_messages(batch).await?;
        }
        Ok(())
    }

    /// The visible context window: everything from the most recent
    /// compaction boundary onward, or the full history if none exists.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        let all = self.store.messages().await?;
        let start = all
            .iter()
            .rposition(|m| m.compaction)
            .unwrap_or(0);
        Ok(all[start..].to_vec())
    }

    /// The full stored history, including retired pre-compaction messages.
    pub async fn full_history(&self) -> Result<Vec<Message>> {
        Ok(self.store.messages().await?)
    }

    /// Install a compaction summary as the new start of context.
    ///
    /// The summary is appended directly rather than through [`Self::append`]:
    /// it must stay a distinct boundary message, so it is never merged into
    /// the preceding entry even when the senders match.  The visible window
    /// never spans the boundary, so alternation still holds for everything
    /// the model sees.
    pub async fn replace_with_summary(&self, summary: Message) -> Result<()> {
        debug_assert!(summary.compaction, "summary must carry the boundary flag");
        self.store.append_messages(vec![summary]).await?;
        Ok(())
    }
}

/// Merge adjacent same-sender entries within a batch.
fn normalize(messages: Vec<Message>) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        match out.pop() {
            Some(last) if last.sender == msg.sender => out.push(last.merge(msg)),
            Some(last) => {
                out.push(last);
                out.push(msg);
            }
            None => out.push(msg),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
