//! # Chitragupta Core
//!
//! Memory substrate for a long-running AI assistant: a persistent,
//! queryable knowledge store that retains conversation sessions, extracted
//! facts, and learned behavioral traces, and returns ranked context
//! snippets for prompt injection.
//!
//! The four load-bearing subsystems:
//!
//! - **Knowledge graph with incremental PageRank**: a mutable directed graph
//!   over sessions, turns, memories, files, tools, and concepts; scores
//!   maintained under continuous edge churn via push-residual propagation.
//! - **Hybrid retrieval**: dense cosine + graph salience + BM25-lite in a
//!   single ranking, with optional topic-biased (personalized) PageRank.
//! - **Multi-round query planning**: heuristic decomposition into weighted
//!   sub-queries with gap-driven follow-ups and weighted fusion.
//! - **Community detection and budget allocation**: Leiden-style clustering
//!   for community-aware retrieval; Sinkhorn-Knopp normalization for
//!   splitting a context-token budget across the four memory streams.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chitragupta_core::{MemorySubstrate, SubstrateConfig};
//!
//! let mut substrate = MemorySubstrate::open(SubstrateConfig::default())?;
//!
//! // Ingest a conversation turn
//! substrate.ingest_turn("sess-1", "user", "We moved ingest to Postgres").await;
//!
//! // Store an explicit memory
//! substrate.ingest_utterance("sess-1", "remember that I prefer terse answers").await;
//!
//! // Retrieve ranked context
//! let results = substrate.query("what changed in ingest?", None).await;
//! let context = substrate.build_context(None, None).await;
//! substrate.save();
//! ```
//!
//! Offline use needs no provider: embeddings fall back to a deterministic
//! hash and extraction to keyword frequency, so every pipeline stays
//! testable without external services.

// ============================================================================
// MODULES
// ============================================================================

pub mod budget;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod graph;
pub mod providers;
pub mod retrieval;
pub mod scoring;
pub mod session;
pub mod smaran;
pub mod storage;
pub mod substrate;

mod hash;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Graph store and algorithms
pub use graph::{
    community::{annotate_communities, find_bridge_nodes, partition, Community, LeidenConfig,
        PartitionResult},
    incremental::IncrementalPageRank,
    node_id,
    pagerank::{compute_pagerank, Bias, IterationMode, PageRankOptions},
    Direction, Edge, GraphError, GraphStats, KnowledgeGraph, Node, NodeType,
};

// Retrieval
pub use retrieval::{
    chunking::{chunk_text, split_sentences, Chunk},
    planner::{decompose, fuse, is_complex, key_terms, plan_followups, FusedResult,
        PlannerConfig, SubQuery},
    RetrievalConfig, RetrievalEngine, RetrievedNode,
};

// Embeddings
pub use embeddings::{
    hash_embedding, EmbeddingConfig, EmbeddingError, EmbeddingService, EMBEDDING_DIMENSIONS,
};

// Entity extraction
pub use extract::{keyword_entities, ner::ner_entities, Entity, EntityExtractor};

// Smaran memory store
pub use smaran::{
    detect_category,
    intent::{detect_memory_intent, MemoryAction, MemoryIntent},
    MemoryCategory, MemoryEntry, MemoryPatch, MemorySource, RememberOptions, SmaranConfig,
    SmaranError, SmaranStore,
};

// Budget allocation
pub use budget::{
    allocate_budgets, build_affinity_matrix, compute_token_budgets, sinkhorn_knopp,
    StreamSignals, PRESERVATION_RATIOS, STREAMS, STREAM_COUNT,
};

// Scoring primitives
pub use scoring::{bm25_lite, cosine, estimate_tokens, jaccard_overlap, tokenize, STOP_WORDS};

// Storage
pub use storage::{Result, SqliteStore, StorageError};

// Session codec
pub use session::{parse_markdown, write_markdown, CodecError, Session, ToolCall, ToolOutcome, Turn};

// Providers
pub use providers::{ProviderClient, ProviderConfig, ProviderError};

// Substrate facade
pub use config::{HomeDirs, SubstrateConfig};
pub use substrate::{MemoryDispatch, MemorySubstrate, TurnIngest};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Edge, FusedResult, KnowledgeGraph, MemoryCategory, MemoryDispatch, MemoryEntry,
        MemorySubstrate, Node, NodeType, Result, RetrievalEngine, SmaranStore, StorageError,
        SubstrateConfig,
    };

    pub use crate::{EmbeddingConfig, EmbeddingService};

    pub use crate::{IncrementalPageRank, LeidenConfig, PageRankOptions, PartitionResult};
}
