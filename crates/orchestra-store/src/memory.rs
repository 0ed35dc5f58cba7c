//! In-memory session store.
//!
//! Backs tests and ephemeral sessions that do not need to survive a
//! restart.  Same contract as the SQLite store, no I/O.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use orchestra_core::{
    Message, PermissionStatus, Store, StoreError, StoreResult, Task, TaskStatus,
};

#[derive(Default)]
struct Inner {
    messages: Vec<Message>,
    token_count: u64,
    turn_count: u64,
    tasks: Vec<Task>,
    permissions: HashMap<String, PermissionStatus>,
}

/// A session store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(format!("mutex poisoned: {e}")))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn messages(&self) -> StoreResult<Vec<Message>> {
        Ok(self.lock()?.messages.clone())
    }

    async fn append_messages(&self, messages: Vec<Message>) -> StoreResult<()> {
        self.lock()?.messages.extend(messages);
        Ok(())
    }

    async fn update_last_message(&self, message: Message) -> StoreResult<()> {
        let mut inner = self.lock()?;
        match inner.messages.last_mut() {
            Some(last) => {
                *last = message;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "message",
                id: "latest".into(),
            }),
        }
    }

    async fn token_count(&self) -> StoreResult<u64> {
        Ok(self.lock()?.token_count)
    }

    async fn add_tokens(&self, tokens: u64) -> StoreResult<()> {
        self.lock()?.token_count += tokens;
        Ok(())
    }

    async fn turn_count(&self) -> StoreResult<u64> {
        Ok(self.lock()?.turn_count)
    }

    async fn increment_turn(&self) -> StoreResult<()> {
        self.lock()?.turn_count += 1;
        Ok(())
    }

    async fn reset_counters(&self) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.token_count = 0;
        inner.turn_count = 0;
        Ok(())
    }

    async fn tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.lock()?.tasks.clone())
    }

    async fn add_tasks(&self, tasks: Vec<Task>) -> StoreResult<()> {
        self.lock()?.tasks.extend(tasks);
        Ok(())
    }

    async fn update_task(&self, id: &str, status: TaskStatus) -> StoreResult<()> {
        let mut inner = self.lock()?;
        match inner.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "task",
                id: id.to_string(),
            }),
        }
    }

    async fn permission(&self, tool: &str) -> StoreResult<PermissionStatus> {
        Ok(self
            .lock()?
            .permissions
            .get(tool)
            .copied()
            .unwrap_or(PermissionStatus::Unset))
    }

    async fn set_permission(&self, tool: &str, status: PermissionStatus) -> StoreResult<()> {
        let mut inner = self.lock()?;
        match status {
            PermissionStatus::Unset => {
                inner.permissions.remove(tool);
            }
            other => {
                inner.permissions.insert(tool.to_string(), other);
            }
        }
        Ok(())
    }
}
