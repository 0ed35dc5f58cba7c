//! Model invocation wrapper.
//!
//! [`PromptMachine`] owns the system prompt and the event-subscriber list,
//! so callers hand it only the conversation window and tool definitions.
//! Streaming events from the backend fan out to every subscriber in
//! subscription order.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use orchestra_core::{
    AgentEvent, Message, Model, ModelOutput, PromptRequest, Subscriber, ToolDefinition,
};

use crate::error::Result;

/// Wraps a model backend with a fixed system prompt and event fan-out.
pub struct PromptMachine {
    model: Arc<dyn Model>,
    system_prompt: Option<String>,
    subscribers: Mutex<Vec<(u64, Arc<dyn Subscriber>)>>,
    next_subscriber_id: Mutex<u64>,
}

impl PromptMachine {
    /// Create a machine over a backend, with an optional system prompt.
    pub fn new(model: Arc<dyn Model>, system_prompt: Option<String>) -> Self {
        Self {
            model,
            system_prompt,
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: Mutex::new(0),
        }
    }

    // Both locks only guard plain list/counter state, so a guard poisoned
    // by a panicking holder is reclaimed rather than propagated.
    fn subscriber_list(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<dyn Subscriber>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe to in-flight events.  Returns an id for [`Self::unsubscribe`].
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> u64 {
        let id = {
            let mut next = self
                .next_subscriber_id
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let id = *next;
            *next += 1;
            id
        };
        self.subscriber_list().push((id, subscriber));
        id
    }

    /// Remove a subscriber.  Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        self.subscriber_list().retain(|(sid, _)| *sid != id);
    }

    /// Deliver one event to every subscriber, in subscription order.
    pub async fn notify(&self, event: &AgentEvent) {
        let subscribers: Vec<Arc<dyn Subscriber>> = self
            .subscriber_list()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber.record(event).await;
        }
    }

    /// Run one model call over the given window.
    ///
    /// Streaming events emitted by the backend are fanned out to the
    /// subscribers as they arrive.
    pub async fn prompt(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        signal: Option<&CancellationToken>,
    ) -> Result<ModelOutput> {
        debug!(
            messages = messages.len(),
            tools = tools.len(),
            "dispatching model call"
        );
        let request = PromptRequest {
            system: self.system_prompt.clone(),
            messages,
            tools,
        };
        let sink = FanOut { machine: self };
        let output = self.model.prompt(request, &sink, signal).await?;
        debug!(
            tokens_in = output.tokens_in,
            tokens_out = output.tokens_out,
            "model call complete"
        );
        Ok(output)
    }
}

/// Bridges the backend's event sink onto the machine's subscriber list.
struct FanOut<'a> {
    machine: &'a PromptMachine,
}

#[async_trait]
impl Subscriber for FanOut<'_> {
    async fn record(&self, event: &AgentEvent) {
        self.machine.notify(event).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::ModelResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that echoes the last user message and streams one delta.
    struct EchoModel;

    #[async_trait]
    impl Model for EchoModel {
        async fn prompt(
            &self,
            request: PromptRequest,
            notify: &dyn Subscriber,
            _signal: Option<&CancellationToken>,
        ) -> ModelResult<ModelOutput> {
            let reply = request
                .messages
                .last()
                .map(|m| m.text.clone())
                .unwrap_or_default();
            notify
                .record(&AgentEvent::TextDelta {
                    text: reply.clone(),
                })
                .await;
            Ok(ModelOutput {
                messages: vec![Message::agent(reply)],
                tokens_in: 1,
                tokens_out: 1,
            })
        }
    }

    struct Recorder {
        deltas: AtomicUsize,
    }

    #[async_trait]
    impl Subscriber for Recorder {
        async fn record(&self, event: &AgentEvent) {
            if matches!(event, AgentEvent::TextDelta { .. }) {
                self.deltas.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn streams_fan_out_to_subscribers() {
        let machine = PromptMachine::new(Arc::new(EchoModel), Some("be brief".into()));
        let recorder = Arc::new(Recorder {
            deltas: AtomicUsize::new(0),
        });
        machine.subscribe(Arc::clone(&recorder) as Arc<dyn Subscriber>);

        let output = machine
            .prompt(vec![Message::user("hello")], vec![], None)
            .await
            .unwrap();
        assert_eq!(output.text(), "hello");
        assert_eq!(recorder.deltas.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribed_sink_stops_receiving() {
        let machine = PromptMachine::new(Arc::new(EchoModel), None);
        let recorder = Arc::new(Recorder {
            deltas: AtomicUsize::new(0),
        });
        let id = machine.subscribe(Arc::clone(&recorder) as Arc<dyn Subscriber>);
        machine.unsubscribe(id);

        machine
            .prompt(vec![Message::user("hi")], vec![], None)
            .await
            .unwrap();
        assert_eq!(recorder.deltas.load(Ordering::SeqCst), 0);
    }
}
