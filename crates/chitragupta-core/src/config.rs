//! Configuration
//!
//! Every component takes an explicit config record; this module holds the
//! shared pieces: the persistence anchor under `~/.chitragupta` and the
//! substrate-level assembly settings.

use std::path::{Path, PathBuf};

use crate::embeddings::EmbeddingConfig;
use crate::graph::community::LeidenConfig;
use crate::retrieval::planner::PlannerConfig;
use crate::retrieval::RetrievalConfig;
use crate::smaran::SmaranConfig;

/// Environment variable overriding the home anchor
pub const HOME_ENV: &str = "CHITRAGUPTA_HOME";

/// Directory name under the user's home
pub const HOME_DIR_NAME: &str = ".chitragupta";

// ============================================================================
// HOME DIRECTORIES
// ============================================================================

/// Persistence anchor with its fixed subdirectories
#[derive(Debug, Clone)]
pub struct HomeDirs {
    root: PathBuf,
}

impl HomeDirs {
    /// Resolve the anchor: `CHITRAGUPTA_HOME`, else `~/.chitragupta`.
    pub fn resolve() -> Self {
        if let Ok(root) = std::env::var(HOME_ENV) {
            return Self { root: PathBuf::from(root) };
        }
        let root = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(HOME_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME));
        Self { root }
    }

    /// Anchor at an explicit root (tests)
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The anchor itself
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Knowledge-graph persistence directory
    pub fn graphrag_dir(&self) -> PathBuf {
        self.root.join("graphrag")
    }

    /// Session memory directory
    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    /// Smaran entry directory
    pub fn smaran_dir(&self) -> PathBuf {
        self.root.join("smaran")
    }

    /// Primary SQLite database path
    pub fn graph_db(&self) -> PathBuf {
        self.graphrag_dir().join("graph.db")
    }

    /// Legacy graph snapshot path
    pub fn graph_json(&self) -> PathBuf {
        self.graphrag_dir().join("graph.json")
    }

    /// Legacy pagerank snapshot path
    pub fn pagerank_json(&self) -> PathBuf {
        self.graphrag_dir().join("pagerank.json")
    }

    /// Embedding cache path
    pub fn embeddings_json(&self) -> PathBuf {
        self.graphrag_dir().join("embeddings.json")
    }
}

// ============================================================================
// SUBSTRATE CONFIG
// ============================================================================

/// Top-level substrate configuration
#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    /// Persistence anchor
    pub home: HomeDirs,
    /// Embedding service settings
    pub embedding: EmbeddingConfig,
    /// Hybrid retrieval weights
    pub retrieval: RetrievalConfig,
    /// Query planner limits
    pub planner: PlannerConfig,
    /// Smaran store limits
    pub smaran: SmaranConfig,
    /// Community detection parameters
    pub leiden: LeidenConfig,
    /// Default context-assembly token budget
    pub context_budget: usize,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            home: HomeDirs::resolve(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            planner: PlannerConfig::default(),
            smaran: SmaranConfig::default(),
            leiden: LeidenConfig::default(),
            context_budget: 4_000,
        }
    }
}

impl SubstrateConfig {
    /// Offline configuration rooted at an explicit directory (tests)
    pub fn offline_at(root: impl Into<PathBuf>) -> Self {
        Self {
            home: HomeDirs::at(root),
            embedding: EmbeddingConfig::offline(),
            ..Default::default()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
