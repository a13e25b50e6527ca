//! Community Detection
//!
//! Leiden-style modularity optimisation over the live graph, treated as an
//! undirected weighted network. The partition is deterministic for a given
//! seed: node visit order is a seeded shuffle and ties break on community
//! id. Communities below the configured minimum size are merged into their
//! strongest neighbor community.

use std::collections::{HashMap, HashSet};

use crate::hash::seeded_shuffle;

use super::KnowledgeGraph;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Community detection parameters
#[derive(Debug, Clone)]
pub struct LeidenConfig {
    /// Resolution parameter; above 1 fragments, below 1 merges
    pub resolution: f64,
    /// Maximum local-moving passes
    pub max_iterations: usize,
    /// Communities smaller than this merge into their strongest neighbor
    pub min_community_size: usize,
    /// Shuffle seed; same seed yields an identical partition
    pub seed: Option<u64>,
}

impl Default for LeidenConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 10,
            min_community_size: 1,
            seed: None,
        }
    }
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A detected community
#[derive(Debug, Clone)]
pub struct Community {
    /// Community identifier, stable within one partition result
    pub id: usize,
    /// Member node ids, sorted
    pub members: Vec<String>,
    /// Internal edges over possible internal edges, in [0, 1]
    pub internal_density: f64,
    /// Aggregation level; base partitions are level 0
    pub level: usize,
}

/// Partition output
#[derive(Debug, Clone, Default)]
pub struct PartitionResult {
    /// Node id to community id
    pub communities: HashMap<String, usize>,
    /// Per-community details
    pub community_list: Vec<Community>,
    /// Modularity of the final partition
    pub modularity: f64,
    /// Local-moving passes performed
    pub iterations: usize,
}

// ============================================================================
// UNDIRECTED PROJECTION
// ============================================================================

/// Symmetric weighted adjacency built from live edges
struct Projection {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// adjacency[u] -> (v, weight); no self entries
    adjacency: Vec<HashMap<usize, f64>>,
    /// Weighted degree per node
    degree: Vec<f64>,
    /// Total edge weight m (each undirected pair counted once)
    total_weight: f64,
}

impl Projection {
    fn build(graph: &KnowledgeGraph) -> Self {
        let mut ids: Vec<String> = graph.iterate_nodes().map(|n| n.id.clone()).collect();
        ids.sort_unstable();
        let index: HashMap<String, usize> =
            ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();

        let mut adjacency: Vec<HashMap<usize, f64>> = vec![HashMap::new(); ids.len()];
        for edge in graph.live_edges() {
            let (Some(&u), Some(&v)) = (index.get(&edge.source), index.get(&edge.target)) else {
                continue;
            };
            if u == v {
                continue;
            }
            *adjacency[u].entry(v).or_insert(0.0) += edge.weight;
            *adjacency[v].entry(u).or_insert(0.0) += edge.weight;
        }

        let degree: Vec<f64> = adjacency.iter().map(|n| n.values().sum()).collect();
        let total_weight = degree.iter().sum::<f64>() / 2.0;

        Self {
            ids,
            index,
            adjacency,
            degree,
            total_weight,
        }
    }
}

// ============================================================================
// PARTITION
// ============================================================================

/// Partition the live graph into communities.
pub fn partition(graph: &KnowledgeGraph, config: &LeidenConfig) -> PartitionResult {
    let projection = Projection::build(graph);
    let n = projection.ids.len();
    if n == 0 || projection.total_weight <= 0.0 {
        // Isolated nodes each form their own community; empty graph yields none
        return singleton_result(&projection);
    }

    let mut membership: Vec<usize> = (0..n).collect();
    let mut iterations = 0usize;

    // Community aggregates: total weighted degree per community
    let mut community_degree: Vec<f64> = projection.degree.clone();

    let mut order: Vec<usize> = (0..n).collect();
    seeded_shuffle(&mut order, config.seed.unwrap_or(0x5eed));

    for _pass in 0..config.max_iterations.max(1) {
        iterations += 1;
        let mut moved = false;

        for &node in &order {
            let current = membership[node];
            let k_i = projection.degree[node];

            // Weight from node into each neighboring community
            let mut into: HashMap<usize, f64> = HashMap::new();
            for (&neighbor, &weight) in &projection.adjacency[node] {
                *into.entry(membership[neighbor]).or_insert(0.0) += weight;
            }

            // Detach node from its community while evaluating moves
            community_degree[current] -= k_i;
            let m2 = 2.0 * projection.total_weight;

            let gain_of = |community: usize, into: &HashMap<usize, f64>| -> f64 {
                let k_in = into.get(&community).copied().unwrap_or(0.0);
                k_in - config.resolution * community_degree[community] * k_i / m2
            };

            let mut best_community = current;
            let mut best_gain = gain_of(current, &into);
            let mut candidates: Vec<usize> = into.keys().copied().collect();
            candidates.sort_unstable();
            for candidate in candidates {
                let gain = gain_of(candidate, &into);
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    best_community = candidate;
                }
            }

            community_degree[best_community] += k_i;
            if best_community != current {
                membership[node] = best_community;
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }

    merge_small_communities(&projection, &mut membership, config.min_community_size);

    finalize(&projection, &membership, config.resolution, iterations)
}

/// Merge communities below the size floor into their strongest neighbor.
fn merge_small_communities(
    projection: &Projection,
    membership: &mut [usize],
    min_size: usize,
) {
    if min_size <= 1 {
        return;
    }

    loop {
        let mut sizes: HashMap<usize, usize> = HashMap::new();
        for &c in membership.iter() {
            *sizes.entry(c).or_insert(0) += 1;
        }

        let mut small: Vec<usize> = sizes
            .iter()
            .filter(|&(_, &size)| size < min_size)
            .map(|(&c, _)| c)
            .collect();
        small.sort_unstable();
        let Some(&community) = small.first() else {
            return;
        };

        // Strongest neighboring community by total connecting weight
        let mut connection: HashMap<usize, f64> = HashMap::new();
        for (node, &c) in membership.iter().enumerate() {
            if c != community {
                continue;
            }
            for (&neighbor, &weight) in &projection.adjacency[node] {
                let other = membership[neighbor];
                if other != community {
                    *connection.entry(other).or_insert(0.0) += weight;
                }
            }
        }

        let target = connection
            .iter()
            .max_by(|a, b| {
                a.1.partial_cmp(b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(a.0))
            })
            .map(|(&c, _)| c);

        match target {
            Some(target) => {
                for c in membership.iter_mut() {
                    if *c == community {
                        *c = target;
                    }
                }
            }
            // Disconnected small community: nothing to merge into
            None => return,
        }
    }
}

/// Relabel communities compactly, compute density and modularity.
fn finalize(
    projection: &Projection,
    membership: &[usize],
    resolution: f64,
    iterations: usize,
) -> PartitionResult {
    // Stable relabeling: communities ordered by their smallest member id
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (node, &c) in membership.iter().enumerate() {
        groups.entry(c).or_default().push(node);
    }
    let mut ordered: Vec<Vec<usize>> = groups.into_values().collect();
    for members in &mut ordered {
        members.sort_unstable();
    }
    ordered.sort_by(|a, b| projection.ids[a[0]].cmp(&projection.ids[b[0]]));

    let mut communities: HashMap<String, usize> = HashMap::new();
    let mut community_list: Vec<Community> = Vec::new();
    let mut relabeled = vec![0usize; membership.len()];

    for (new_id, members) in ordered.iter().enumerate() {
        let member_set: HashSet<usize> = members.iter().copied().collect();
        let mut internal_pairs = 0usize;
        for &node in members {
            for &neighbor in projection.adjacency[node].keys() {
                if neighbor > node && member_set.contains(&neighbor) {
                    internal_pairs += 1;
                }
            }
        }
        let size = members.len();
        let possible = size * size.saturating_sub(1) / 2;
        let internal_density = if possible == 0 {
            0.0
        } else {
            internal_pairs as f64 / possible as f64
        };

        let member_ids: Vec<String> = members
            .iter()
            .map(|&node| projection.ids[node].clone())
            .collect();
        for &node in members {
            relabeled[node] = new_id;
            communities.insert(projection.ids[node].clone(), new_id);
        }
        community_list.push(Community {
            id: new_id,
            members: member_ids,
            internal_density,
            level: 0,
        });
    }

    let modularity = compute_modularity(projection, &relabeled, resolution);

    PartitionResult {
        communities,
        community_list,
        modularity,
        iterations,
    }
}

fn singleton_result(projection: &Projection) -> PartitionResult {
    let mut communities = HashMap::new();
    let mut community_list = Vec::new();
    for (i, id) in projection.ids.iter().enumerate() {
        communities.insert(id.clone(), i);
        community_list.push(Community {
            id: i,
            members: vec![id.clone()],
            internal_density: 0.0,
            level: 0,
        });
    }
    PartitionResult {
        communities,
        community_list,
        modularity: 0.0,
        iterations: 0,
    }
}

/// Modularity of a partition: `sum_c (in_c / m - resolution * (deg_c / 2m)^2)`.
fn compute_modularity(projection: &Projection, membership: &[usize], resolution: f64) -> f64 {
    let m = projection.total_weight;
    if m <= 0.0 {
        return 0.0;
    }

    let community_count = membership.iter().copied().max().map(|c| c + 1).unwrap_or(0);
    let mut internal = vec![0.0_f64; community_count];
    let mut degree = vec![0.0_f64; community_count];

    for (node, &c) in membership.iter().enumerate() {
        degree[c] += projection.degree[node];
        for (&neighbor, &weight) in &projection.adjacency[node] {
            if neighbor > node && membership[neighbor] == c {
                internal[c] += weight;
            }
        }
    }

    (0..community_count)
        .map(|c| internal[c] / m - resolution * (degree[c] / (2.0 * m)).powi(2))
        .sum()
}

// ============================================================================
// ANNOTATION & BRIDGES
// ============================================================================

/// Write each node's community id into its metadata under `communityId`.
pub fn annotate_communities(graph: &mut KnowledgeGraph, result: &PartitionResult) {
    for (node_id, &community) in &result.communities {
        if let Some(node) = graph.get_node_mut(node_id) {
            node.metadata.insert(
                "communityId".to_string(),
                serde_json::Value::Number(community.into()),
            );
        }
    }
}

/// Nodes with live edges into at least `k` distinct communities, sorted by id.
pub fn find_bridge_nodes(
    graph: &KnowledgeGraph,
    result: &PartitionResult,
    k: usize,
) -> Vec<String> {
    let mut touching: HashMap<&str, HashSet<usize>> = HashMap::new();
    for edge in graph.live_edges() {
        let (Some(&cs), Some(&ct)) = (
            result.communities.get(&edge.source),
            result.communities.get(&edge.target),
        ) else {
            continue;
        };
        touching.entry(&edge.source).or_default().insert(ct);
        touching.entry(&edge.source).or_default().insert(cs);
        touching.entry(&edge.target).or_default().insert(cs);
        touching.entry(&edge.target).or_default().insert(ct);
    }

    let mut bridges: Vec<String> = touching
        .into_iter()
        .filter(|(_, communities)| communities.len() >= k)
        .map(|(id, _)| id.to_string())
        .collect();
    bridges.sort_unstable();
    bridges
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{node_id, Edge, Node, NodeType, WEIGHT_BRIDGE};

    fn cid(label: &str) -> String {
        node_id(NodeType::Concept, label)
    }

    fn two_cliques() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for label in ["a1", "a2", "a3", "b1", "b2", "b3"] {
            graph.upsert_node(Node::new(NodeType::Concept, label, ""));
        }
        for (u, v) in [("a1", "a2"), ("a2", "a3"), ("a1", "a3")] {
            graph.insert_edge(Edge::new(cid(u), cid(v), "related")).unwrap();
        }
        for (u, v) in [("b1", "b2"), ("b2", "b3"), ("b1", "b3")] {
            graph.insert_edge(Edge::new(cid(u), cid(v), "related")).unwrap();
        }
        graph
            .insert_edge(Edge::new(cid("a3"), cid("b1"), "related").with_weight(WEIGHT_BRIDGE))
            .unwrap();
        graph
    }

    #[test]
    fn test_empty_graph() {
        let result = partition(&KnowledgeGraph::new(), &LeidenConfig::default());
        assert!(result.communities.is_empty());
        assert_eq!(result.modularity, 0.0);
    }

    #[test]
    fn test_two_cliques_split() {
        let graph = two_cliques();
        let result = partition(&graph, &LeidenConfig::default());

        let a_side = result.communities[&cid("a1")];
        assert_eq!(result.communities[&cid("a2")], a_side);
        assert_eq!(result.communities[&cid("a3")], a_side);

        let b_side = result.communities[&cid("b1")];
        assert_eq!(result.communities[&cid("b2")], b_side);
        assert_eq!(result.communities[&cid("b3")], b_side);

        assert_ne!(a_side, b_side);
        assert!(result.modularity > 0.0);
    }

    #[test]
    fn test_internal_density_of_cliques() {
        let graph = two_cliques();
        let result = partition(&graph, &LeidenConfig::default());
        for community in &result.community_list {
            assert_eq!(community.members.len(), 3);
            assert!((community.internal_density - 1.0).abs() < 1e-9);
            assert_eq!(community.level, 0);
        }
    }

    #[test]
    fn test_bridge_nodes() {
        let graph = two_cliques();
        let result = partition(&graph, &LeidenConfig::default());
        let bridges = find_bridge_nodes(&graph, &result, 2);
        let mut expected = vec![cid("a3"), cid("b1")];
        expected.sort_unstable();
        assert_eq!(bridges, expected);
    }

    #[test]
    fn test_same_seed_same_partition() {
        let graph = two_cliques();
        let config = LeidenConfig {
            seed: Some(99),
            ..Default::default()
        };
        let first = partition(&graph, &config);
        let second = partition(&graph, &config);
        assert_eq!(first.communities, second.communities);
        assert_eq!(first.modularity, second.modularity);
    }

    #[test]
    fn test_resolution_controls_granularity() {
        let graph = two_cliques();
        let merged = partition(
            &graph,
            &LeidenConfig {
                resolution: 0.05,
                ..Default::default()
            },
        );
        let fragmented = partition(
            &graph,
            &LeidenConfig {
                resolution: 8.0,
                ..Default::default()
            },
        );
        let merged_count = merged.community_list.len();
        let fragmented_count = fragmented.community_list.len();
        assert!(merged_count <= fragmented_count);
    }

    #[test]
    fn test_min_community_size_merges() {
        let mut graph = two_cliques();
        // A pendant node weakly attached to the a-clique
        graph.upsert_node(Node::new(NodeType::Concept, "stray", ""));
        graph
            .insert_edge(Edge::new(cid("a1"), cid("stray"), "related").with_weight(WEIGHT_BRIDGE))
            .unwrap();

        let result = partition(
            &graph,
            &LeidenConfig {
                min_community_size: 3,
                ..Default::default()
            },
        );
        for community in &result.community_list {
            assert!(community.members.len() >= 3);
        }
    }

    #[test]
    fn test_annotate_communities() {
        let mut graph = two_cliques();
        let result = partition(&graph, &LeidenConfig::default());
        annotate_communities(&mut graph, &result);

        let node = graph.get_node(&cid("a1")).unwrap();
        let annotated = node.metadata["communityId"].as_u64().unwrap() as usize;
        assert_eq!(annotated, result.communities[&cid("a1")]);
    }

    #[test]
    fn test_modularity_nonnegative_on_clustered_graphs() {
        let graph = two_cliques();
        let result = partition(&graph, &LeidenConfig::default());
        assert!(result.modularity >= 0.0);
    }

    #[test]
    fn test_isolated_nodes_form_singletons() {
        let mut graph = KnowledgeGraph::new();
        graph.upsert_node(Node::new(NodeType::Concept, "lonely", ""));
        graph.upsert_node(Node::new(NodeType::Concept, "alone", ""));
        let result = partition(&graph, &LeidenConfig::default());
        assert_eq!(result.community_list.len(), 2);
        assert_eq!(result.modularity, 0.0);
    }
}
