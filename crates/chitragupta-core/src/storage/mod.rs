//! Persistence & Migration
//!
//! SQLite is the primary store; legacy JSON files (`graph.json`,
//! `pagerank.json`) are read once, migrated into SQLite inside a single
//! transaction, and renamed to `*.bak`. Saves are full in-transaction
//! rewrites; failures are non-fatal because the in-memory state is
//! authoritative.

pub mod json;
pub mod sqlite;

pub use json::{read_graph_json, read_pagerank_json, write_graph_json, write_pagerank_json};
pub use sqlite::SqliteStore;

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed legacy file
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;
