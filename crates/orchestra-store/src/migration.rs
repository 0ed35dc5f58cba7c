//! Schema migrations.
//!
//! Migrations are static SQL strings keyed by version number.  The
//! applied version is tracked in a `_migrations` table, so running them
//! again is a no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use orchestra_core::StoreResult;

use crate::db::backend;

struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    description: &'static str,
    /// Raw SQL; may contain multiple statements.
    sql: &'static str,
}

/// All migrations in order.  Append new migrations, never edit old ones.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema — messages, counters, tasks, permissions",
    sql: r#"
        CREATE TABLE messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            body       TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE counters (
            id          INTEGER PRIMARY KEY CHECK(id = 1),
            token_count INTEGER NOT NULL DEFAULT 0,
            turn_count  INTEGER NOT NULL DEFAULT 0
        );
        INSERT INTO counters (id) VALUES (1);

        CREATE TABLE tasks (
            id         TEXT PRIMARY KEY,
            imperative TEXT NOT NULL,
            continuous TEXT NOT NULL,
            status     TEXT NOT NULL CHECK(status IN ('pending','in_progress','completed')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_tasks_status ON tasks(status);

        CREATE TABLE permissions (
            tool       TEXT PRIMARY KEY,
            status     TEXT NOT NULL CHECK(status IN ('granted','denied')),
            updated_at INTEGER NOT NULL
        );
    "#,
}];

/// Run all pending migrations against `conn`.
///
/// Synchronous; call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }
    Ok(())
}

/// The latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(backend)
}

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(backend)
}

fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    conn.execute_batch("BEGIN").map_err(backend)?;

    let result = conn
        .execute_batch(migration.sql)
        .and_then(|_| {
            conn.execute(
                "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().timestamp()
                ],
            )
            .map(|_| ())
        });

    match result {
        Ok(()) => conn.execute_batch("COMMIT").map_err(backend),
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(backend(e))
        }
    }
}
