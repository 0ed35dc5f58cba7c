//! # orchestra-store
//!
//! Session persistence backends for the orchestra engine.
//!
//! Two implementations of the `orchestra_core::Store` contract:
//!
//! - [`SqliteStore`] — durable sessions in a SQLite file (WAL mode,
//!   async access via the blocking thread pool).
//! - [`MemoryStore`] — ephemeral sessions and tests.
//!
//! ## Quick start
//!
//! ```ignore
//! use orchestra_store::SqliteStore;
//!
//! let store = SqliteStore::open("data/session.db").await?;
//! ```

pub mod db;
pub mod memory;
pub mod migration;
pub mod sqlite;

pub use db::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
