//! SQLite Store
//!
//! Primary persistence for the knowledge graph and PageRank scores. The
//! schema is fixed; timestamps are epoch milliseconds. Each save rewrites
//! nodes, edges, and pagerank inside one transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::graph::{Edge, KnowledgeGraph, Node, NodeType};

use super::{json, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    type TEXT,
    label TEXT,
    content TEXT,
    metadata TEXT,
    created_at INTEGER,
    updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS edges (
    source TEXT,
    target TEXT,
    relationship TEXT,
    weight REAL,
    pramana TEXT,
    viveka TEXT,
    valid_from INTEGER,
    valid_until INTEGER,
    recorded_at INTEGER,
    superseded_at INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_identity ON edges(
    source, target, relationship,
    COALESCE(valid_from, -1), COALESCE(valid_until, -1),
    COALESCE(recorded_at, -1), COALESCE(superseded_at, -1)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);

CREATE TABLE IF NOT EXISTS pagerank (
    node_id TEXT PRIMARY KEY,
    score REAL,
    updated_at INTEGER
);
"#;

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed persistence for graph and PageRank state
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store at the given path and apply the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;

        // Configure SQLite for performance
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn, path })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the store holds no nodes yet
    pub fn is_empty(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Rewrite nodes, edges, and pagerank inside one transaction.
    pub fn save_graph(
        &mut self,
        graph: &KnowledgeGraph,
        pagerank: &HashMap<String, f64>,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM nodes", [])?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM pagerank", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO nodes
                 (id, type, label, content, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for node in graph.iterate_nodes() {
                let metadata = serde_json::to_string(&node.metadata)?;
                stmt.execute(params![
                    node.id,
                    node.node_type.as_str(),
                    node.label,
                    node.content,
                    metadata,
                    node.created_at.timestamp_millis(),
                    node.updated_at.timestamp_millis(),
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO edges
                 (source, target, relationship, weight, pramana, viveka,
                  valid_from, valid_until, recorded_at, superseded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for edge in graph.iterate_edges() {
                stmt.execute(params![
                    edge.source,
                    edge.target,
                    edge.relationship,
                    edge.weight,
                    edge.pramana,
                    edge.viveka,
                    edge.valid_from.map(|t| t.timestamp_millis()),
                    edge.valid_until.map(|t| t.timestamp_millis()),
                    edge.recorded_at.map(|t| t.timestamp_millis()),
                    edge.superseded_at.map(|t| t.timestamp_millis()),
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO pagerank (node_id, score, updated_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (node_id, score) in pagerank {
                stmt.execute(params![node_id, score, now])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Load the graph and PageRank scores.
    pub fn load_graph(&self) -> Result<(KnowledgeGraph, HashMap<String, f64>)> {
        let mut graph = KnowledgeGraph::new();

        let mut stmt = self.conn.prepare(
            "SELECT id, type, label, content, metadata, created_at, updated_at FROM nodes",
        )?;
        let nodes = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let node_type: String = row.get(1)?;
            let label: String = row.get(2)?;
            let content: String = row.get(3)?;
            let metadata: String = row.get(4)?;
            let created_at: i64 = row.get(5)?;
            let updated_at: i64 = row.get(6)?;
            Ok((id, node_type, label, content, metadata, created_at, updated_at))
        })?;
        for row in nodes {
            let (id, node_type, label, content, metadata, created_at, updated_at) = row?;
            let metadata: HashMap<String, serde_json::Value> =
                serde_json::from_str(&metadata).unwrap_or_default();
            graph.upsert_node(Node {
                id,
                node_type: NodeType::parse_name(&node_type),
                label,
                content,
                metadata,
                created_at: from_millis(created_at),
                updated_at: from_millis(updated_at),
            });
        }
        drop(stmt);

        let mut stmt = self.conn.prepare(
            "SELECT source, target, relationship, weight, pramana, viveka,
                    valid_from, valid_until, recorded_at, superseded_at FROM edges",
        )?;
        let edges = stmt.query_map([], |row| {
            Ok(Edge {
                source: row.get(0)?,
                target: row.get(1)?,
                relationship: row.get(2)?,
                weight: row.get(3)?,
                pramana: row.get(4)?,
                viveka: row.get(5)?,
                valid_from: row.get::<_, Option<i64>>(6)?.map(from_millis),
                valid_until: row.get::<_, Option<i64>>(7)?.map(from_millis),
                recorded_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
                superseded_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
            })
        })?;
        for edge in edges {
            let edge = edge?;
            if let Err(e) = graph.insert_edge(edge) {
                tracing::warn!("skipping persisted edge: {}", e);
            }
        }
        drop(stmt);

        let mut stmt = self.conn.prepare("SELECT node_id, score FROM pagerank")?;
        let scores = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut pagerank = HashMap::new();
        for score in scores {
            let (node_id, value) = score?;
            pagerank.insert(node_id, value);
        }

        Ok((graph, pagerank))
    }

    /// One-shot legacy migration: when the store is empty and `graph.json`
    /// exists, load the JSON state, write it in one transaction, and rename
    /// the legacy files to `*.bak`. Idempotent and non-fatal: a malformed
    /// legacy file logs a warning and leaves the store empty.
    pub fn migrate_from_json(
        &mut self,
        graph_path: &Path,
        pagerank_path: &Path,
    ) -> Result<bool> {
        if !self.is_empty()? {
            return Ok(false);
        }
        if !graph_path.exists() {
            return Ok(false);
        }

        let graph = match json::read_graph_json(graph_path) {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!("legacy graph file unreadable, skipping migration: {}", e);
                return Ok(false);
            }
        };
        let pagerank = if pagerank_path.exists() {
            json::read_pagerank_json(pagerank_path).unwrap_or_else(|e| {
                tracing::warn!("legacy pagerank file unreadable: {}", e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        self.save_graph(&graph, &pagerank)?;

        rename_to_bak(graph_path);
        if pagerank_path.exists() {
            rename_to_bak(pagerank_path);
        }
        tracing::info!(
            "migrated legacy JSON graph ({} nodes) into {}",
            graph.node_count(),
            self.path.display()
        );
        Ok(true)
    }
}

fn rename_to_bak(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    if let Err(e) = std::fs::rename(path, PathBuf::from(&backup)) {
        tracing::warn!("could not rename {} to backup: {}", path.display(), e);
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
