//! Hybrid Retrieval Engine
//!
//! Ranks graph nodes for a query by combining dense cosine similarity,
//! graph-walk salience (normalized PageRank), and sparse lexical match
//! (BM25-lite). Node embeddings come from the read-through cache populated
//! at ingestion time; nodes that were never embedded contribute zero cosine.

pub mod chunking;
pub mod planner;

use std::collections::HashMap;

use crate::embeddings::EmbeddingService;
use crate::graph::{Direction, KnowledgeGraph, Node, NodeType};
use crate::scoring::{bm25_lite, cosine};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Hybrid scoring weights and limits
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Dense cosine weight
    pub alpha: f64,
    /// PageRank weight
    pub beta: f64,
    /// Lexical BM25-lite weight
    pub gamma: f64,
    /// Default result count
    pub top_k: usize,
    /// Direction used by neighbor expansion
    pub neighbor_direction: Direction,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: 0.60,
            beta: 0.25,
            gamma: 0.15,
            top_k: 10,
            neighbor_direction: Direction::Both,
        }
    }
}

// ============================================================================
// RESULT TYPE
// ============================================================================

/// A scored node returned by retrieval
#[derive(Debug, Clone)]
pub struct RetrievedNode {
    /// Node id
    pub id: String,
    /// Node type
    pub node_type: NodeType,
    /// Node label
    pub label: String,
    /// Node content
    pub content: String,
    /// Combined hybrid score
    pub score: f64,
    /// Dense similarity component (weighted)
    pub cosine_component: f64,
    /// Graph salience component (weighted)
    pub pagerank_component: f64,
    /// Lexical component (weighted)
    pub text_component: f64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Hybrid retrieval over the knowledge graph
#[derive(Debug, Clone, Default)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create an engine with default weights
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rank all live nodes for a query, returning the top `limit`.
    pub async fn search(
        &self,
        graph: &KnowledgeGraph,
        pagerank: &HashMap<String, f64>,
        embeddings: &EmbeddingService,
        query: &str,
        limit: Option<usize>,
    ) -> Vec<RetrievedNode> {
        self.search_filtered(graph, pagerank, embeddings, query, limit, |_| true)
            .await
    }

    /// Rank the nodes accepted by a candidate filter. Community-scoped
    /// retrieval passes a membership predicate here.
    pub async fn search_filtered<F>(
        &self,
        graph: &KnowledgeGraph,
        pagerank: &HashMap<String, f64>,
        embeddings: &EmbeddingService,
        query: &str,
        limit: Option<usize>,
        accept: F,
    ) -> Vec<RetrievedNode>
    where
        F: Fn(&Node) -> bool,
    {
        let candidates: Vec<&Node> = graph
            .iterate_nodes()
            .filter(|n| !n.is_tombstoned() && accept(n))
            .collect();
        self.rank(candidates, pagerank, embeddings, query, limit)
            .await
    }

    /// Rank a node and its one-hop neighbors ("context around v").
    pub async fn context_around(
        &self,
        graph: &KnowledgeGraph,
        pagerank: &HashMap<String, f64>,
        embeddings: &EmbeddingService,
        node_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Vec<RetrievedNode> {
        let mut candidates: Vec<&Node> = Vec::new();
        if let Some(center) = graph.get_node(node_id) {
            candidates.push(center);
        }
        for neighbor in graph.neighbors(node_id, self.config.neighbor_direction) {
            if !candidates.iter().any(|n| n.id == neighbor.id) {
                candidates.push(neighbor);
            }
        }
        self.rank(candidates, pagerank, embeddings, query, limit)
            .await
    }

    async fn rank(
        &self,
        candidates: Vec<&Node>,
        pagerank: &HashMap<String, f64>,
        embeddings: &EmbeddingService,
        query: &str,
        limit: Option<usize>,
    ) -> Vec<RetrievedNode> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let query_embedding = embeddings.embed(query).await;
        let max_pr = pagerank
            .values()
            .copied()
            .fold(0.0_f64, f64::max)
            .max(f64::MIN_POSITIVE);

        let mut results: Vec<RetrievedNode> = candidates
            .into_iter()
            .map(|node| {
                let dense = embeddings
                    .cached(&node.content)
                    .map(|v| cosine(&query_embedding, &v) as f64)
                    .unwrap_or(0.0)
                    .max(0.0);
                let salience = pagerank.get(&node.id).copied().unwrap_or(0.0) / max_pr;
                let text = format!("{} {}", node.content, node.label);
                let lexical = bm25_lite(query, &text);

                let cosine_component = self.config.alpha * dense;
                let pagerank_component = self.config.beta * salience;
                let text_component = self.config.gamma * lexical;

                RetrievedNode {
                    id: node.id.clone(),
                    node_type: node.node_type,
                    label: node.label.clone(),
                    content: node.content.clone(),
                    score: cosine_component + pagerank_component + text_component,
                    cosine_component,
                    pagerank_component,
                    text_component,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit.unwrap_or(self.config.top_k));
        results
    }
}

// ============================================================================
// TESTS
// ============================================================================
