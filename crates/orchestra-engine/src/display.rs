//! Interactive display-slot management.
//!
//! Tools pause the loop to collect structured human input by pushing a
//! *slot* onto the display stack.  A rendering layer subscribes to stack
//! snapshots, draws whatever the slot's renderer key and input payload
//! describe, and answers by calling [`DisplayManager::resolve`] or
//! [`DisplayManager::reject`] with the slot id.  Payload shapes crossing
//! this boundary are opaque to the engine.
//!
//! Blocking waits are oneshot channels keyed by slot id: exactly one
//! external resolution wakes exactly one waiter, and duplicate
//! resolutions are no-ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Slots and renderers
// ---------------------------------------------------------------------------

/// One pending interactive display request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    /// Monotonically assigned id, unique within this manager instance.
    pub id: u64,

    /// Which registered renderer should draw this slot.
    pub renderer: String,

    /// Opaque input payload for the renderer.
    pub input: Value,
}

/// A slot as submitted by a tool, before an id is assigned.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    /// Which renderer should draw this slot.
    pub renderer: String,

    /// Opaque input payload for the renderer.
    pub input: Value,
}

/// Declarative description of a renderer the consuming UI layer provides.
///
/// Recorded for discovery; the manager never interprets the schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererDescriptor {
    /// Renderer key referenced by [`Slot::renderer`].
    pub name: String,

    /// JSON Schema of the slot input this renderer accepts.
    pub input_schema: Value,

    /// JSON Schema of the value this renderer resolves with.
    pub output_schema: Value,
}

/// Receives the full stack snapshot after every mutation.
#[async_trait::async_trait]
pub trait StackListener: Send + Sync {
    /// Called with the current stack.  Listeners are awaited sequentially,
    /// in subscription order.
    async fn stack_changed(&self, stack: Vec<Slot>);
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

type Resolver = oneshot::Sender<std::result::Result<Value, String>>;

#[derive(Default)]
struct Inner {
    next_slot_id: u64,
    stack: Vec<Slot>,
    pending: HashMap<u64, Resolver>,
    renderers: Vec<RendererDescriptor>,
    listeners: Vec<(u64, Arc<dyn StackListener>)>,
    next_listener_id: u64,
}

/// Owns the slot stack and the pending-resolution map.
///
/// Slot ids are never reused within a manager instance, and at most one
/// resolver is ever stored per id.  While [`Self::has_pending`] is true an
/// external interrupt layer should suppress barge-in: tearing down session
/// state mid-resolution strands the waiting tool call.
#[derive(Default)]
pub struct DisplayManager {
    inner: Mutex<Inner>,
}

impl DisplayManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves `Inner` consistent, so a guard
    // poisoned by a panicking holder is reclaimed rather than propagated.
    fn state(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record a renderer descriptor for the consuming UI layer.
    pub fn register_renderer(&self, renderer: RendererDescriptor) {
        let mut inner = self.state();
        debug!(renderer = %renderer.name, "renderer registered");
        inner.renderers.push(renderer);
    }

    /// Registered renderer descriptors.
    pub fn renderers(&self) -> Vec<RendererDescriptor> {
        self.state().renderers.clone()
    }

    /// Push a slot without waiting for resolution.  Returns the assigned id
    /// immediately; the calling tool keeps executing.
    pub async fn push_and_forget(&self, request: SlotRequest) -> u64 {
        let (id, snapshot, listeners) = {
            let mut inner = self.state();
            let id = inner.push(request);
            (id, inner.stack.clone(), inner.listener_snapshot())
        };
        debug!(slot_id = id, "slot pushed (fire-and-forget)");
        notify(&listeners, snapshot).await;
        id
    }

    /// Push a slot and wait until the UI resolves or rejects it.
    ///
    /// The resolver is registered before any listener sees the new stack,
    /// so a synchronous UI cannot answer a slot that has no waiter yet.
    pub async fn push_and_wait(&self, request: SlotRequest) -> Result<Value> {
        let (id, rx, snapshot, listeners) = {
            let mut inner = self.state();
            let id = inner.push(request);
            let (tx, rx) = oneshot::channel();
            inner.pending.insert(id, tx);
            (id, rx, inner.stack.clone(), inner.listener_snapshot())
        };
        debug!(slot_id = id, "slot pushed (blocking)");
        notify(&listeners, snapshot).await;

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(EngineError::SlotRejected { id, reason }),
            // Sender dropped: the slot was force-removed during teardown.
            Err(_) => Err(EngineError::SlotClosed { id }),
        }
    }

    /// Settle a pending slot with a value.  Unknown ids (already settled,
    /// removed, or never issued) are ignored, which makes resolution
    /// idempotent against duplicate UI events.
    pub async fn resolve(&self, id: u64, value: Value) {
        self.settle(id, Ok(value)).await;
    }

    /// Settle a pending slot with a rejection.  Unknown ids are ignored.
    pub async fn reject(&self, id: u64, reason: impl Into<String>) {
        self.settle(id, Err(reason.into())).await;
    }

    async fn settle(&self, id: u64, answer: std::result::Result<Value, String>) {
        let notification = {
            let mut inner = self.state();
            match inner.pending.remove(&id) {
                Some(tx) => {
                    inner.stack.retain(|slot| slot.id != id);
                    // The waiter may have given up; a dead receiver is fine.
                    let _ = tx.send(answer);
                    Some((inner.stack.clone(), inner.listener_snapshot()))
                }
                None => {
                    trace!(slot_id = id, "settle for unknown slot id ignored");
                    None
                }
            }
        };
        if let Some((snapshot, listeners)) = notification {
            debug!(slot_id = id, "slot settled");
            notify(&listeners, snapshot).await;
        }
    }

    /// Force-remove one slot without answering its waiter (the waiter, if
    /// any, wakes with a "slot closed" error).
    pub async fn remove_slot(&self, id: u64) {
        let notification = {
            let mut inner = self.state();
            let before = inner.stack.len();
            inner.stack.retain(|slot| slot.id != id);
            inner.pending.remove(&id);
            (inner.stack.len() != before)
                .then(|| (inner.stack.clone(), inner.listener_snapshot()))
        };
        if let Some((snapshot, listeners)) = notification {
            debug!(slot_id = id, "slot force-removed");
            notify(&listeners, snapshot).await;
        }
    }

    /// Remove every slot and drop every pending resolver (session
    /// teardown).  Waiters wake with a "slot closed" error.
    pub async fn clear_stack(&self) {
        let (snapshot, listeners) = {
            let mut inner = self.state();
            inner.stack.clear();
            inner.pending.clear();
            (inner.stack.clone(), inner.listener_snapshot())
        };
        debug!("display stack cleared");
        notify(&listeners, snapshot).await;
    }

    /// Subscribe to stack snapshots.  Returns an id for [`Self::unsubscribe`].
    pub fn subscribe(&self, listener: Arc<dyn StackListener>) -> u64 {
        let mut inner = self.state();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, listener));
        id
    }

    /// Remove a listener.  Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.state();
        inner.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Current stack snapshot.
    pub fn stack(&self) -> Vec<Slot> {
        self.state().stack.clone()
    }

    /// Whether any blocking slot is awaiting resolution.  External
    /// interrupt layers should suppress barge-in while this is true.
    pub fn has_pending(&self) -> bool {
        !self.state().pending.is_empty()
    }
}

impl Inner {
    fn push(&mut self, request: SlotRequest) -> u64 {
        let id = self.next_slot_id;
        self.next_slot_id += 1;
        self.stack.push(Slot {
            id,
            renderer: request.renderer,
            input: request.input,
        });
        id
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn StackListener>> {
        self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Deliver a snapshot to each listener in turn, outside the state lock.
async fn notify(listeners: &[Arc<dyn StackListener>], snapshot: Vec<Slot>) {
    for listener in listeners {
        listener.stack_changed(snapshot.clone()).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(renderer: &str) -> SlotRequest {
        SlotRequest {
            renderer: renderer.to_string(),
            input: serde_json::json!({}),
        }
    }

    struct CountingListener {
        calls: AtomicUsize,
        last_len: AtomicUsize,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last_len: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl StackListener for CountingListener {
        async fn stack_changed(&self, stack: Vec<Slot>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(stack.len(), Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn slot_ids_are_monotonic_and_never_reused() {
        let manager = DisplayManager::new();
        let a = manager.push_and_forget(request("form")).await;
        let b = manager.push_and_forget(request("form")).await;
        manager.remove_slot(a).await;
        let c = manager.push_and_forget(request("form")).await;
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn push_and_wait_resolves_with_exact_value() {
        let manager = Arc::new(DisplayManager::new());

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.push_and_wait(request("confirm")).await });

        // Wait for the slot to appear, then resolve it.
        let id = loop {
            if let Some(slot) = manager.stack().first() {
                break slot.id;
            }
            tokio::task::yield_now().await;
        };
        manager.resolve(id, serde_json::json!({"approved": true})).await;

        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!({"approved": true}));
        assert!(manager.stack().is_empty());
        assert!(!manager.has_pending());
    }

    #[tokio::test]
    async fn duplicate_resolution_is_a_noop() {
        let manager = Arc::new(DisplayManager::new());

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.push_and_wait(request("confirm")).await });

        let id = loop {
            if let Some(slot) = manager.stack().first() {
                break slot.id;
            }
            tokio::task::yield_now().await;
        };

        manager.resolve(id, serde_json::json!(1)).await;
        // Second resolve and a late reject must both be ignored.
        manager.resolve(id, serde_json::json!(2)).await;
        manager.reject(id, "too late").await;

        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!(1));
    }

    #[tokio::test]
    async fn reject_surfaces_reason() {
        let manager = Arc::new(DisplayManager::new());

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.push_and_wait(request("confirm")).await });

        let id = loop {
            if let Some(slot) = manager.stack().first() {
                break slot.id;
            }
            tokio::task::yield_now().await;
        };
        manager.reject(id, "user dismissed").await;

        match waiter.await.unwrap() {
            Err(EngineError::SlotRejected { reason, .. }) => {
                assert_eq!(reason, "user dismissed");
            }
            other => panic!("expected SlotRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clear_stack_wakes_waiters_with_closed() {
        let manager = Arc::new(DisplayManager::new());

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.push_and_wait(request("confirm")).await });

        while manager.stack().is_empty() {
            tokio::task::yield_now().await;
        }
        manager.clear_stack().await;

        assert!(matches!(
            waiter.await.unwrap(),
            Err(EngineError::SlotClosed { .. })
        ));
        assert!(!manager.has_pending());
    }

    #[tokio::test]
    async fn listeners_receive_snapshots_until_unsubscribed() {
        let manager = DisplayManager::new();
        let listener = CountingListener::new();
        let sub = manager.subscribe(Arc::clone(&listener) as Arc<dyn StackListener>);

        manager.push_and_forget(request("a")).await;
        manager.push_and_forget(request("b")).await;
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
        assert_eq!(listener.last_len.load(Ordering::SeqCst), 2);

        manager.unsubscribe(sub);
        manager.push_and_forget(request("c")).await;
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn has_pending_tracks_blocking_slots_only() {
        let manager = Arc::new(DisplayManager::new());
        manager.push_and_forget(request("banner")).await;
        assert!(!manager.has_pending());

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.push_and_wait(request("confirm")).await });

        while !manager.has_pending() {
            tokio::task::yield_now().await;
        }

        let id = manager.stack().last().unwrap().id;
        manager.resolve(id, Value::Null).await;
        waiter.await.unwrap().unwrap();
        assert!(!manager.has_pending());
    }
}
