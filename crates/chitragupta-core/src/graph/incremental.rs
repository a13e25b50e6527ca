//! Incremental PageRank
//!
//! Push-residual maintenance of PageRank scores under continuous edge
//! insertion and removal. Each edge change injects residuals at the affected
//! nodes; residuals propagate along out-edges, largest first, until all fall
//! below epsilon. Total work is O(1/epsilon) per edge change, so scores stay
//! within tolerance of a full recompute without re-running power iteration.

use std::collections::HashMap;

use super::pagerank::{compute_pagerank, PageRankOptions, DAMPING, EPSILON};
use super::KnowledgeGraph;

/// Residual-propagation budget per propagation pass, as a multiple of N
const PROPAGATION_BUDGET_FACTOR: usize = 20;

// ============================================================================
// ENGINE
// ============================================================================

/// Incremental PageRank engine
///
/// Tracks `(ranks, out-links, in-links)` alongside the graph store. Callers
/// must serialise updates; the engine is single-owner like the graph itself.
#[derive(Debug, Clone)]
pub struct IncrementalPageRank {
    damping: f64,
    epsilon: f64,
    ranks: HashMap<String, f64>,
    out_links: HashMap<String, Vec<String>>,
    in_links: HashMap<String, Vec<String>>,
    residuals: HashMap<String, f64>,
}

impl Default for IncrementalPageRank {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalPageRank {
    /// Create an empty engine
    pub fn new() -> Self {
        Self {
            damping: DAMPING,
            epsilon: EPSILON,
            ranks: HashMap::new(),
            out_links: HashMap::new(),
            in_links: HashMap::new(),
            residuals: HashMap::new(),
        }
    }

    /// Initialize from a graph and previously persisted scores. Nodes
    /// missing from the persisted map start at 1/N.
    pub fn from_graph(graph: &KnowledgeGraph, persisted: &HashMap<String, f64>) -> Self {
        let mut engine = Self::new();
        let n = graph.node_count();
        if n == 0 {
            return engine;
        }
        let default_rank = 1.0 / n as f64;

        for node in graph.iterate_nodes() {
            let rank = persisted.get(&node.id).copied().unwrap_or(default_rank);
            engine.ranks.insert(node.id.clone(), rank);
            engine.out_links.entry(node.id.clone()).or_default();
            engine.in_links.entry(node.id.clone()).or_default();
        }
        for edge in graph.live_edges() {
            engine
                .out_links
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            engine
                .in_links
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
        engine
    }

    /// Current scores
    pub fn ranks(&self) -> &HashMap<String, f64> {
        &self.ranks
    }

    /// Score for a single node
    pub fn score(&self, id: &str) -> f64 {
        self.ranks.get(id).copied().unwrap_or(0.0)
    }

    /// Number of tracked nodes
    pub fn node_count(&self) -> usize {
        self.ranks.len()
    }

    fn ensure_node(&mut self, id: &str) {
        if !self.ranks.contains_key(id) {
            self.out_links.entry(id.to_string()).or_default();
            self.in_links.entry(id.to_string()).or_default();
            let n = self.ranks.len() + 1;
            self.ranks.insert(id.to_string(), 1.0 / n as f64);
        }
    }

    /// Register an inserted edge and propagate the resulting residuals.
    pub fn add_edge(&mut self, source: &str, target: &str) {
        self.ensure_node(source);
        self.ensure_node(target);

        let rank_u = self.score(source);
        let old_out: Vec<String> = self.out_links.get(source).cloned().unwrap_or_default();
        let l_old = old_out.len();
        let l_new = l_old + 1;

        // New out-edge receives a share of u's rank; every prior out-neighbor
        // gives back the difference between the old and new shares.
        *self.residuals.entry(target.to_string()).or_insert(0.0) +=
            self.damping * rank_u / l_new as f64;
        if l_old > 0 {
            let delta = self.damping * rank_u * (1.0 / l_new as f64 - 1.0 / l_old as f64);
            for w in &old_out {
                if w != target {
                    *self.residuals.entry(w.clone()).or_insert(0.0) += delta;
                }
            }
        }

        self.out_links
            .entry(source.to_string())
            .or_default()
            .push(target.to_string());
        self.in_links
            .entry(target.to_string())
            .or_default()
            .push(source.to_string());

        self.propagate();
    }

    /// Register a removed (or tombstoned) edge and propagate. Unknown edges
    /// are ignored.
    pub fn remove_edge(&mut self, source: &str, target: &str) {
        let Some(out) = self.out_links.get_mut(source) else {
            return;
        };
        let Some(position) = out.iter().position(|t| t == target) else {
            return;
        };
        out.remove(position);
        if let Some(inc) = self.in_links.get_mut(target) {
            if let Some(p) = inc.iter().position(|s| s == source) {
                inc.remove(p);
            }
        }

        let rank_u = self.score(source);
        let remaining: Vec<String> = self.out_links.get(source).cloned().unwrap_or_default();
        let l_new = remaining.len();
        let l_old = l_new + 1;

        // Mirror of add_edge with opposite signs: the removed target loses
        // its share, the survivors absorb it.
        *self.residuals.entry(target.to_string()).or_insert(0.0) -=
            self.damping * rank_u / l_old as f64;
        if l_new > 0 {
            let delta = self.damping * rank_u * (1.0 / l_new as f64 - 1.0 / l_old as f64);
            for w in &remaining {
                if w != target {
                    *self.residuals.entry(w.clone()).or_insert(0.0) += delta;
                }
            }
        }

        self.propagate();
    }

    /// Drain residuals, largest magnitude first, with a bounded budget.
    fn propagate(&mut self) {
        let budget = PROPAGATION_BUDGET_FACTOR * self.ranks.len().max(1);
        for _ in 0..budget {
            let Some((id, residual)) = self
                .residuals
                .iter()
                .max_by(|a, b| {
                    a.1.abs()
                        .partial_cmp(&b.1.abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(id, r)| (id.clone(), *r))
            else {
                return;
            };

            if residual.abs() < self.epsilon {
                return;
            }

            self.residuals.remove(&id);
            let rank = self.ranks.entry(id.clone()).or_insert(0.0);
            *rank = (*rank + residual).max(0.0);

            let out = self.out_links.get(&id).cloned().unwrap_or_default();
            if !out.is_empty() {
                let share = self.damping * residual / out.len() as f64;
                for w in &out {
                    *self.residuals.entry(w.clone()).or_insert(0.0) += share;
                }
            }
        }
        tracing::debug!("residual propagation budget exhausted");
    }

    /// Full power iteration from scratch; reinitialises the incremental
    /// state. Invoked after bulk compaction.
    pub fn recompute(&mut self, graph: &KnowledgeGraph) {
        let fresh = compute_pagerank(graph, &PageRankOptions::default());
        *self = Self::from_graph(graph, &fresh);
    }
}

// ============================================================================
// TESTS
// ============================================================================
