//! SQLite-backed session store.
//!
//! Messages are stored as JSON documents in insertion order; the store
//! never interprets their content.  Counters live in a single fixed row,
//! tasks and permissions in their own tables.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use orchestra_core::{
    Message, PermissionStatus, Store, StoreError, StoreResult, Task, TaskStatus,
};

use crate::db::{backend, Database};

/// A session store persisted to a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open (or create) a store at `path`, migrating the schema as needed.
    pub async fn open(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let db = Database::open_and_migrate(path).await?;
        Ok(Self { db })
    }

    /// An in-memory store, mainly for tests.
    pub async fn in_memory() -> StoreResult<Self> {
        let db = Database::open_in_memory()?;
        db.run_migrations().await?;
        Ok(Self { db })
    }

    /// Wrap an already-migrated database handle.
    pub fn with_database(db: Database) -> Self {
        Self { db }
    }
}

fn task_status(text: &str) -> StoreResult<TaskStatus> {
    match text {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        other => Err(StoreError::Backend(format!("unknown task status: {other}"))),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn messages(&self) -> StoreResult<Vec<Message>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare("SELECT body FROM messages ORDER BY id")
                    .map_err(backend)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(backend)?;

                let mut messages = Vec::new();
                for body in rows {
                    let body = body.map_err(backend)?;
                    messages.push(serde_json::from_str(&body)?);
                }
                Ok(messages)
            })
            .await
    }

    async fn append_messages(&self, messages: Vec<Message>) -> StoreResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction().map_err(backend)?;
                let now = chrono::Utc::now().timestamp();
                for message in &messages {
                    let body = serde_json::to_string(message)?;
                    tx.execute(
                        "INSERT INTO messages (body, created_at) VALUES (?1, ?2)",
                        params![body, now],
                    )
                    .map_err(backend)?;
                }
                tx.commit().map_err(backend)?;
                debug!(count = messages.len(), "messages appended");
                Ok(())
            })
            .await
    }

    async fn update_last_message(&self, message: Message) -> StoreResult<()> {
        self.db
            .execute(move |conn| {
                let body = serde_json::to_string(&message)?;
                let updated = conn
                    .execute(
                        "UPDATE messages SET body = ?1
                         WHERE id = (SELECT MAX(id) FROM messages)",
                        params![body],
                    )
                    .map_err(backend)?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "message",
                        id: "latest".into(),
                    });
                }
                Ok(())
            })
            .await
    }

    async fn token_count(&self) -> StoreResult<u64> {
        self.db
            .execute(|conn| {
                conn.query_row("SELECT token_count FROM counters WHERE id = 1", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
                .map_err(backend)
            })
            .await
    }

    async fn add_tokens(&self, tokens: u64) -> StoreResult<()> {
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE counters SET token_count = token_count + ?1 WHERE id = 1",
                    params![tokens as i64],
                )
                .map_err(backend)?;
                Ok(())
            })
            .await
    }

    async fn turn_count(&self) -> StoreResult<u64> {
        self.db
            .execute(|conn| {
                conn.query_row("SELECT turn_count FROM counters WHERE id = 1", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
                .map_err(backend)
            })
            .await
    }

    async fn increment_turn(&self) -> StoreResult<()> {
        self.db
            .execute(|conn| {
                conn.execute(
                    "UPDATE counters SET turn_count = turn_count + 1 WHERE id = 1",
                    [],
                )
                .map_err(backend)?;
                Ok(())
            })
            .await
    }

    async fn reset_counters(&self) -> StoreResult<()> {
        self.db
            .execute(|conn| {
                conn.execute(
                    "UPDATE counters SET token_count = 0, turn_count = 0 WHERE id = 1",
                    [],
                )
                .map_err(backend)?;
                Ok(())
            })
            .await
    }

    async fn tasks(&self) -> StoreResult<Vec<Task>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, imperative, continuous, status
                         FROM tasks ORDER BY created_at, id",
                    )
                    .map_err(backend)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })
                    .map_err(backend)?;

                let mut tasks = Vec::new();
                for row in rows {
                    let (id, imperative, continuous, status) = row.map_err(backend)?;
                    tasks.push(Task {
                        id,
                        imperative,
                        continuous,
                        status: task_status(&status)?,
                    });
                }
                Ok(tasks)
            })
            .await
    }

    async fn add_tasks(&self, tasks: Vec<Task>) -> StoreResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction().map_err(backend)?;
                let now = chrono::Utc::now().timestamp();
                for task in &tasks {
                    tx.execute(
                        "INSERT INTO tasks (id, imperative, continuous, status, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            task.id,
                            task.imperative,
                            task.continuous,
                            task.status.to_string(),
                            now
                        ],
                    )
                    .map_err(backend)?;
                }
                tx.commit().map_err(backend)?;
                Ok(())
            })
            .await
    }

    async fn update_task(&self, id: &str, status: TaskStatus) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE tasks SET status = ?1 WHERE id = ?2",
                        params![status.to_string(), id],
                    )
                    .map_err(backend)?;
                if updated == 0 {
                    return Err(StoreError::NotFound { entity: "task", id });
                }
                Ok(())
            })
            .await
    }

    async fn permission(&self, tool: &str) -> StoreResult<PermissionStatus> {
        let tool = tool.to_string();
        self.db
            .execute(move |conn| {
                let status: Option<String> = conn
                    .query_row(
                        "SELECT status FROM permissions WHERE tool = ?1",
                        params![tool],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(backend)?;
                Ok(match status.as_deref() {
                    Some("granted") => PermissionStatus::Granted,
                    Some("denied") => PermissionStatus::Denied,
                    _ => PermissionStatus::Unset,
                })
            })
            .await
    }

    async fn set_permission(&self, tool: &str, status: PermissionStatus) -> StoreResult<()> {
        let tool = tool.to_string();
        self.db
            .execute(move |conn| {
                match status {
                    // Unset clears the persisted decision entirely.
                    PermissionStatus::Unset => {
                        conn.execute("DELETE FROM permissions WHERE tool = ?1", params![tool])
                            .map_err(backend)?;
                    }
                    PermissionStatus::Granted | PermissionStatus::Denied => {
                        let text = if status == PermissionStatus::Granted {
                            "granted"
                        } else {
                            "denied"
                        };
                        conn.execute(
                            "INSERT INTO permissions (tool, status, updated_at)
                             VALUES (?1, ?2, ?3)
                             ON CONFLICT(tool) DO UPDATE SET
                                 status = excluded.status,
                                 updated_at = excluded.updated_at",
                            params![tool, text, chrono::Utc::now().timestamp()],
                        )
                        .map_err(backend)?;
                    }
                }
                Ok(())
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_round_trip_in_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .append_messages(vec![Message::user("one"), Message::agent("two")])
            .await
            .unwrap();

        let messages = store.messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "one");
        assert_eq!(messages[1].text, "two");
    }

    #[tokio::test]
    async fn update_last_message_replaces_only_the_tail() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .append_messages(vec![Message::user("keep"), Message::agent("replace me")])
            .await
            .unwrap();
        store
            .update_last_message(Message::agent("replaced"))
            .await
            .unwrap();

        let messages = store.messages().await.unwrap();
        assert_eq!(messages[0].text, "keep");
        assert_eq!(messages[1].text, "replaced");
    }

    #[tokio::test]
    async fn update_last_message_on_empty_history_is_not_found() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.update_last_message(Message::user("x")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn counters_accumulate_and_reset() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_tokens(100).await.unwrap();
        store.add_tokens(50).await.unwrap();
        store.increment_turn().await.unwrap();
        assert_eq!(store.token_count().await.unwrap(), 150);
        assert_eq!(store.turn_count().await.unwrap(), 1);

        store.reset_counters().await.unwrap();
        assert_eq!(store.token_count().await.unwrap(), 0);
        assert_eq!(store.turn_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tasks_round_trip_with_status_updates() {
        let store = SqliteStore::in_memory().await.unwrap();
        let task = Task::new("Fix the bug", "Fixing the bug");
        let id = task.id.clone();
        store.add_tasks(vec![task]).await.unwrap();

        store.update_task(&id, TaskStatus::InProgress).await.unwrap();
        let tasks = store.tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
        assert_eq!(tasks[0].imperative, "Fix the bug");
    }

    #[tokio::test]
    async fn updating_a_missing_task_is_not_found() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.update_task("nope", TaskStatus::Completed).await;
        assert!(matches!(
            result,
            Err(StoreError::NotFound { entity: "task", .. })
        ));
    }

    #[tokio::test]
    async fn permissions_default_to_unset_and_persist_decisions() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(
            store.permission("browser").await.unwrap(),
            PermissionStatus::Unset
        );

        store
            .set_permission("browser", PermissionStatus::Granted)
            .await
            .unwrap();
        assert_eq!(
            store.permission("browser").await.unwrap(),
            PermissionStatus::Granted
        );

        store
            .set_permission("browser", PermissionStatus::Denied)
            .await
            .unwrap();
        assert_eq!(
            store.permission("browser").await.unwrap(),
            PermissionStatus::Denied
        );

        store
            .set_permission("browser", PermissionStatus::Unset)
            .await
            .unwrap();
        assert_eq!(
            store.permission("browser").await.unwrap(),
            PermissionStatus::Unset
        );
    }

    #[tokio::test]
    async fn store_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");

        {
            let store = SqliteStore::open(path.clone()).await.unwrap();
            store
                .append_messages(vec![Message::user("persisted")])
                .await
                .unwrap();
            store.add_tokens(42).await.unwrap();
        }

        let store = SqliteStore::open(path).await.unwrap();
        assert_eq!(store.messages().await.unwrap()[0].text, "persisted");
        assert_eq!(store.token_count().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn message_tool_payloads_survive_storage() {
        use orchestra_core::{ToolCall, ToolOutcome, ToolResult};

        let store = SqliteStore::in_memory().await.unwrap();
        let call = ToolCall {
            id: Some("tc_1".into()),
            name: "echo".into(),
            input: serde_json::json!({"text": "hi"}),
        };
        let result = ToolResult::new(&call, ToolOutcome::success(serde_json::json!("hi")));

        store
            .append_messages(vec![
                Message::agent_with_tool_calls("", vec![call]),
                Message::tool_results(vec![result]),
            ])
            .await
            .unwrap();

        let messages = store.messages().await.unwrap();
        assert_eq!(messages[0].tool_calls.len(), 1);
        assert_eq!(messages[1].tool_results.len(), 1);
        assert_eq!(messages[1].tool_results[0].call_id.as_deref(), Some("tc_1"));
    }
}
