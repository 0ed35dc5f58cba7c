//! The model contract.
//!
//! A model backend receives the visible message window plus tool
//! definitions and returns generated messages with token usage.  Streaming
//! backends report incremental progress through the [`Subscriber`] sink
//! they are handed; non-streaming backends may ignore it entirely.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ModelResult;
use crate::event::Subscriber;
use crate::message::Message;
use crate::tool::ToolDefinition;

/// One model invocation.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// System prompt, when the caller carries one.
    pub system: Option<String>,

    /// The visible conversation window, oldest first.
    pub messages: Vec<Message>,

    /// Tools the model may invoke.  Empty for plain-text requests such as
    /// compaction summarization.
    pub tools: Vec<ToolDefinition>,
}

/// What a model invocation produced.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Messages generated by the model, in order.  Agent-sender messages;
    /// any of them may carry tool calls.
    pub messages: Vec<Message>,

    /// Prompt tokens consumed by this call.
    pub tokens_in: u64,

    /// Tokens generated by this call.
    pub tokens_out: u64,
}

impl ModelOutput {
    /// All tool calls requested across the produced messages, in order.
    pub fn tool_calls(&self) -> Vec<crate::message::ToolCall> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().cloned())
            .collect()
    }

    /// Concatenated text of the produced messages, newline-joined,
    /// skipping empty entries.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for msg in &self.messages {
            if msg.text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&msg.text);
        }
        out
    }
}

/// A language-model backend.
///
/// Streaming implementations emit [`crate::AgentEvent::TextDelta`] and
/// [`crate::AgentEvent::ToolUse`] through `notify` as content arrives, and
/// finish with [`crate::AgentEvent::ModelResponseComplete`] mirroring the
/// returned output.  `signal`, when supplied and cancelled, should abort
/// the call with [`crate::ModelError::Cancelled`].
#[async_trait]
pub trait Model: Send + Sync {
    /// Run one model invocation.
    async fn prompt(
        &self,
        request: PromptRequest,
        notify: &dyn Subscriber,
        signal: Option<&CancellationToken>,
    ) -> ModelResult<ModelOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    #[test]
    fn output_collects_tool_calls_in_order() {
        let output = ModelOutput {
            messages: vec![
                Message::agent_with_tool_calls(
                    "",
                    vec![ToolCall {
                        id: Some("a".into()),
                        name: "first".into(),
                        input: serde_json::Value::Null,
                    }],
                ),
                Message::agent_with_tool_calls(
                    "",
                    vec![ToolCall {
                        id: Some("b".into()),
                        name: "second".into(),
                        input: serde_json::Value::Null,
                    }],
                ),
            ],
            tokens_in: 10,
            tokens_out: 5,
        };

        let calls = output.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn output_text_joins_nonempty_messages() {
        let output = ModelOutput {
            messages: vec![
                Message::agent("part one"),
                Message::agent(""),
                Message::agent("part two"),
            ],
            tokens_in: 0,
            tokens_out: 0,
        };
        assert_eq!(output.text(), "part one\npart two");
    }
}
