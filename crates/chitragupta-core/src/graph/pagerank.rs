//! PageRank
//!
//! Full power iteration over the live graph, in two variants that converge
//! to the same fixed point: synchronous (Jacobi) and in-place (Gauss-Seidel,
//! the default). Teleportation is uniform unless a topic string or explicit
//! bias map is supplied, in which case the bias is an L1-normalized
//! bag-of-words similarity between the topic and each node's content.

use std::collections::HashMap;

use crate::scoring::{bow_cosine, term_frequencies, tokenize};

use super::KnowledgeGraph;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Damping factor
pub const DAMPING: f64 = 0.85;

/// Convergence threshold on the max per-node delta
pub const EPSILON: f64 = 1e-6;

/// Iteration cap
pub const MAX_ITERATIONS: usize = 150;

// ============================================================================
// OPTIONS
// ============================================================================

/// Iteration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationMode {
    /// Synchronous sweep from the previous vector
    Jacobi,
    /// In-place sweep using already-updated values; typically converges in
    /// about half the iterations on these corpora
    #[default]
    GaussSeidel,
}

/// Teleportation bias
#[derive(Debug, Clone, Default)]
pub enum Bias {
    /// Uniform 1/N teleportation
    #[default]
    Uniform,
    /// Bag-of-words similarity between a topic string and node content
    Topic(String),
    /// Explicit per-node bias values, L1-normalized before use
    Map(HashMap<String, f64>),
}

/// PageRank options
#[derive(Debug, Clone)]
pub struct PageRankOptions {
    /// Damping factor
    pub damping: f64,
    /// Convergence threshold
    pub epsilon: f64,
    /// Iteration cap
    pub max_iterations: usize,
    /// Iteration scheme
    pub mode: IterationMode,
    /// Teleportation bias
    pub bias: Bias,
}

impl Default for PageRankOptions {
    fn default() -> Self {
        Self {
            damping: DAMPING,
            epsilon: EPSILON,
            max_iterations: MAX_ITERATIONS,
            mode: IterationMode::default(),
            bias: Bias::default(),
        }
    }
}

impl PageRankOptions {
    /// Options biased toward a topic string
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            bias: Bias::Topic(topic.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// COMPUTATION
// ============================================================================

/// Compute PageRank over the live graph.
///
/// Scores are non-negative and sum to approximately 1 on a connected graph
/// modulo dangling-node teleportation slack.
pub fn compute_pagerank(graph: &KnowledgeGraph, opts: &PageRankOptions) -> HashMap<String, f64> {
    // Deterministic node order for reproducible sweeps
    let mut ids: Vec<&str> = graph.iterate_nodes().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();
    let n = ids.len();
    if n == 0 {
        return HashMap::new();
    }

    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    // Live-edge adjacency: out-degree and reverse links
    let mut out_degree = vec![0usize; n];
    let mut in_links: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in graph.live_edges() {
        let (Some(&u), Some(&v)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str()))
        else {
            continue;
        };
        out_degree[u] += 1;
        in_links[v].push(u);
    }

    let bias = bias_vector(graph, &ids, &opts.bias);
    let d = opts.damping;
    let mut ranks = vec![1.0 / n as f64; n];

    for _iteration in 0..opts.max_iterations {
        let dangling_sum: f64 = (0..n)
            .filter(|&i| out_degree[i] == 0)
            .map(|i| ranks[i])
            .sum();

        let mut max_delta = 0.0_f64;
        match opts.mode {
            IterationMode::Jacobi => {
                let previous = ranks.clone();
                for v in 0..n {
                    let inbound: f64 = in_links[v]
                        .iter()
                        .map(|&u| previous[u] / out_degree[u] as f64)
                        .sum();
                    let next =
                        (1.0 - d) * bias[v] + d * inbound + d * dangling_sum / n as f64;
                    max_delta = max_delta.max((next - previous[v]).abs());
                    ranks[v] = next;
                }
            }
            IterationMode::GaussSeidel => {
                for v in 0..n {
                    let inbound: f64 = in_links[v]
                        .iter()
                        .map(|&u| ranks[u] / out_degree[u] as f64)
                        .sum();
                    let next =
                        (1.0 - d) * bias[v] + d * inbound + d * dangling_sum / n as f64;
                    max_delta = max_delta.max((next - ranks[v]).abs());
                    ranks[v] = next;
                }
            }
        }

        if max_delta < opts.epsilon {
            break;
        }
    }

    ids.iter()
        .enumerate()
        .map(|(i, &id)| (id.to_string(), ranks[i]))
        .collect()
}

/// Build the L1-normalized teleportation vector for the given bias.
fn bias_vector(graph: &KnowledgeGraph, ids: &[&str], bias: &Bias) -> Vec<f64> {
    let n = ids.len();
    let uniform = vec![1.0 / n as f64; n];

    let raw: Vec<f64> = match bias {
        Bias::Uniform => return uniform,
        Bias::Topic(topic) => {
            let topic_tf = term_frequencies(&tokenize(topic));
            ids.iter()
                .map(|&id| {
                    graph
                        .get_node(id)
                        .map(|node| {
                            let text = format!("{} {}", node.label, node.content);
                            let node_tf = term_frequencies(&tokenize(&text));
                            bow_cosine(&topic_tf, &node_tf)
                        })
                        .unwrap_or(0.0)
                })
                .collect()
        }
        Bias::Map(map) => ids
            .iter()
            .map(|&id| map.get(id).copied().unwrap_or(0.0).max(0.0))
            .collect(),
    };

    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        uniform
    } else {
        raw.into_iter().map(|v| v / total).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
