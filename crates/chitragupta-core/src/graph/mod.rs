//! Knowledge Graph Store
//!
//! Mutable directed graph over sessions, turns, memories, files, tools,
//! concepts, people, and organizations. Edges are bi-temporal: world-time
//! validity (`valid_from`/`valid_until`) and system-time provenance
//! (`recorded_at`/`superseded_at`). Removal tombstones edges by setting
//! `superseded_at` rather than deleting them.

pub mod community;
pub mod incremental;
pub mod pagerank;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hash::fnv1a_32;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Graph error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An operation would breach a store invariant
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

// ============================================================================
// NODE TYPES
// ============================================================================

/// Closed set of node types in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A conversation session
    Session,
    /// A single turn within a session
    Turn,
    /// A stored user memory
    Memory,
    /// A file path
    File,
    /// A tool or command
    Tool,
    /// A concept or topic
    #[default]
    Concept,
    /// A person
    Person,
    /// An organization
    Organization,
}

impl NodeType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Session => "session",
            NodeType::Turn => "turn",
            NodeType::Memory => "memory",
            NodeType::File => "file",
            NodeType::Tool => "tool",
            NodeType::Concept => "concept",
            NodeType::Person => "person",
            NodeType::Organization => "organization",
        }
    }

    /// Parse from string name, defaulting unknown names to `Concept`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "session" => NodeType::Session,
            "turn" => NodeType::Turn,
            "memory" => NodeType::Memory,
            "file" => NodeType::File,
            "tool" => NodeType::Tool,
            "person" => NodeType::Person,
            "organization" => NodeType::Organization,
            _ => NodeType::Concept,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// NODE
// ============================================================================

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable content-derived identifier
    pub id: String,
    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Short human-readable name
    pub label: String,
    /// Indexed text content
    pub content: String,
    /// Open scalar metadata; round-trips through JSON
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Derive the stable id for a node from its type and canonical label.
pub fn node_id(node_type: NodeType, label: &str) -> String {
    let canonical = label.trim().to_lowercase();
    let hash = fnv1a_32(format!("{}|{}", node_type.as_str(), canonical).as_bytes());
    format!("{}-{:08x}", node_type.as_str(), hash)
}

impl Node {
    /// Create a node with a content-derived id
    pub fn new(node_type: NodeType, label: impl Into<String>, content: impl Into<String>) -> Self {
        let label = label.into();
        let now = Utc::now();
        Self {
            id: node_id(node_type, &label),
            node_type,
            label,
            content: content.into(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a metadata key
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether this node has been soft-removed
    pub fn is_tombstoned(&self) -> bool {
        self.metadata
            .get("tombstoned")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

// ============================================================================
// EDGE
// ============================================================================

/// Weight for weak bridge edges
pub const WEIGHT_BRIDGE: f64 = 0.1;

/// Weight for primary edges
pub const WEIGHT_PRIMARY: f64 = 1.0;

/// A directed, bi-temporal edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Short verb label (`derived_from`, `mentions`, `related`, `child_of`)
    pub relationship: String,
    /// Non-negative weight
    pub weight: f64,
    /// Provenance: how the assertion was obtained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pramana: Option<String>,
    /// Judgment note attached at assertion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viveka: Option<String>,
    /// World time the edge starts to hold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// World time the edge stops holding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// System time the assertion was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    /// System time the assertion was retracted; `None` means live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
}

impl Edge {
    /// Create a primary-weight edge recorded now
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship: relationship.into(),
            weight: WEIGHT_PRIMARY,
            pramana: None,
            viveka: None,
            valid_from: None,
            valid_until: None,
            recorded_at: Some(Utc::now()),
            superseded_at: None,
        }
    }

    /// Set the edge weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the provenance label
    pub fn with_pramana(mut self, pramana: impl Into<String>) -> Self {
        self.pramana = Some(pramana.into());
        self
    }

    /// Whether the assertion has not been retracted
    pub fn is_live(&self) -> bool {
        self.superseded_at.is_none()
    }

    /// Whether the edge holds at the given world time
    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        let after_start = self.valid_from.map(|t| time >= t).unwrap_or(true);
        let before_end = self.valid_until.map(|t| time <= t).unwrap_or(true);
        after_start && before_end
    }

    /// Validate the temporal invariant: ordered windows on both axes
    pub fn check_temporal(&self) -> Result<(), GraphError> {
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err(GraphError::Invariant(format!(
                    "edge {} -> {}: validFrom after validUntil",
                    self.source, self.target
                )));
            }
        }
        if let (Some(recorded), Some(superseded)) = (self.recorded_at, self.superseded_at) {
            if recorded > superseded {
                return Err(GraphError::Invariant(format!(
                    "edge {} -> {}: recordedAt after supersededAt",
                    self.source, self.target
                )));
            }
        }
        if self.weight < 0.0 {
            return Err(GraphError::Invariant(format!(
                "edge {} -> {}: negative weight",
                self.source, self.target
            )));
        }
        Ok(())
    }

    fn same_identity(&self, other: &Edge) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.relationship == other.relationship
    }

    fn same_window(&self, other: &Edge) -> bool {
        self.valid_from == other.valid_from && self.valid_until == other.valid_until
    }
}

// ============================================================================
// TRAVERSAL DIRECTION
// ============================================================================

/// Neighbor traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Edges pointing into the node
    In,
    /// Edges pointing out of the node
    Out,
    /// Both directions
    #[default]
    Both,
}

// ============================================================================
// GRAPH STATS
// ============================================================================

/// Summary counts for diagnostics and context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// Total node count
    pub nodes: usize,
    /// Total edge count including tombstones
    pub edges: usize,
    /// Live edge count
    pub live_edges: usize,
    /// Node counts per type
    pub nodes_by_type: HashMap<String, usize>,
}

// ============================================================================
// KNOWLEDGE GRAPH
// ============================================================================

/// In-memory knowledge graph with adjacency indexes
#[derive(Debug, Default, Clone)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    /// Node id -> indexes of outgoing edges
    out: HashMap<String, Vec<usize>>,
    /// Node id -> indexes of incoming edges
    inc: HashMap<String, Vec<usize>>,
}

impl KnowledgeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node by id. Replacement keeps the original
    /// creation time and refreshes `updated_at`.
    pub fn upsert_node(&mut self, mut node: Node) -> &Node {
        if let Some(existing) = self.nodes.get(&node.id) {
            node.created_at = existing.created_at;
            node.updated_at = Utc::now();
        }
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        &self.nodes[&id]
    }

    /// Insert an edge. Skipped (returns `Ok(false)`) when either endpoint is
    /// absent or when a live edge with the same identity and bi-temporal
    /// window already exists. Temporal invariants are checked first.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<bool, GraphError> {
        edge.check_temporal()?;

        if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
            tracing::debug!(
                "skipping edge {} -> {}: endpoint missing",
                edge.source,
                edge.target
            );
            return Ok(false);
        }

        let duplicate = self.edges.iter().any(|existing| {
            existing.is_live() && existing.same_identity(&edge) && existing.same_window(&edge)
        });
        if duplicate {
            return Ok(false);
        }

        let index = self.edges.len();
        self.out.entry(edge.source.clone()).or_default().push(index);
        self.inc.entry(edge.target.clone()).or_default().push(index);
        self.edges.push(edge);
        Ok(true)
    }

    /// Look up a node by id
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable lookup, used by community annotation
    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Whether a node exists
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate all nodes
    pub fn iterate_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate all edges, tombstones included
    pub fn iterate_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Iterate live edges whose endpoints both exist
    pub fn live_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| {
            e.is_live() && self.nodes.contains_key(&e.source) && self.nodes.contains_key(&e.target)
        })
    }

    /// Nodes of a given type
    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .collect()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges, tombstones included
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// One-hop neighbors of a node over live edges
    pub fn neighbors(&self, node_id: &str, direction: Direction) -> Vec<&Node> {
        let mut ids: Vec<&str> = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(indexes) = self.out.get(node_id) {
                for &i in indexes {
                    let edge = &self.edges[i];
                    if edge.is_live() && !ids.contains(&edge.target.as_str()) {
                        ids.push(&edge.target);
                    }
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(indexes) = self.inc.get(node_id) {
                for &i in indexes {
                    let edge = &self.edges[i];
                    if edge.is_live() && !ids.contains(&edge.source.as_str()) {
                        ids.push(&edge.source);
                    }
                }
            }
        }
        ids.into_iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Tombstone every live edge owned by a session scope and soft-remove
    /// the session node and its turn nodes. Returns the tombstoned edges as
    /// `(source, target)` pairs so the incremental PageRank engine can be
    /// informed.
    pub fn remove_session(&mut self, session_id: &str) -> Vec<(String, String)> {
        let mut owned: Vec<String> = vec![session_id.to_string()];
        for node in self.nodes.values() {
            if node.node_type == NodeType::Turn
                && node
                    .metadata
                    .get("sessionId")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| s == session_id)
            {
                owned.push(node.id.clone());
            }
        }
        self.tombstone_scope(&owned)
    }

    /// Tombstone every live edge owned by a memory scope (the memory node
    /// and its `derived_from` assertions).
    pub fn remove_memory(&mut self, memory_id: &str) -> Vec<(String, String)> {
        let owned = [memory_id.to_string()];
        self.tombstone_scope(&owned)
    }

    fn tombstone_scope(&mut self, owned: &[String]) -> Vec<(String, String)> {
        let now = Utc::now();
        let mut removed = Vec::new();
        for edge in &mut self.edges {
            if edge.is_live()
                && (owned.contains(&edge.source) || owned.contains(&edge.target))
            {
                edge.superseded_at = Some(now);
                removed.push((edge.source.clone(), edge.target.clone()));
            }
        }
        for id in owned {
            if let Some(node) = self.nodes.get_mut(id) {
                node.metadata
                    .insert("tombstoned".to_string(), serde_json::Value::Bool(true));
                node.updated_at = now;
            }
        }
        removed
    }

    /// Summary counts
    pub fn stats(&self) -> GraphStats {
        let mut by_type: HashMap<String, usize> = HashMap::new();
        for node in self.nodes.values() {
            *by_type.entry(node.node_type.as_str().to_string()).or_insert(0) += 1;
        }
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            live_edges: self.live_edges().count(),
            nodes_by_type: by_type,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(label: &str) -> Node {
        Node::new(NodeType::Concept, label, format!("about {}", label))
    }

    #[test]
    fn test_node_id_stable_and_canonical() {
        assert_eq!(node_id(NodeType::Concept, "Rust"), node_id(NodeType::Concept, "  rust "));
        assert_ne!(node_id(NodeType::Concept, "rust"), node_id(NodeType::Tool, "rust"));
        assert!(node_id(NodeType::File, "src/main.rs").starts_with("file-"));
    }

    #[test]
    fn test_node_type_roundtrip() {
        for node_type in [
            NodeType::Session,
            NodeType::Turn,
            NodeType::Memory,
            NodeType::File,
            NodeType::Tool,
            NodeType::Concept,
            NodeType::Person,
            NodeType::Organization,
        ] {
            assert_eq!(NodeType::parse_name(node_type.as_str()), node_type);
        }
        assert_eq!(NodeType::parse_name("unknown"), NodeType::Concept);
    }

    #[test]
    fn test_insert_edge_requires_endpoints() {
        let mut graph = KnowledgeGraph::new();
        graph.upsert_node(concept("rust"));

        let inserted = graph
            .insert_edge(Edge::new(node_id(NodeType::Concept, "rust"), "missing", "related"))
            .unwrap();
        assert!(!inserted);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_insert_edge_idempotent_for_live_duplicates() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.upsert_node(concept("rust")).id.clone();
        let b = graph.upsert_node(concept("tokio")).id.clone();

        assert!(graph.insert_edge(Edge::new(&a, &b, "related")).unwrap());
        assert!(!graph.insert_edge(Edge::new(&a, &b, "related")).unwrap());
        assert_eq!(graph.edge_count(), 1);

        // A different relationship is a distinct edge
        assert!(graph.insert_edge(Edge::new(&a, &b, "mentions")).unwrap());
    }

    #[test]
    fn test_insert_edge_rejects_inverted_window() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.upsert_node(concept("a")).id.clone();
        let b = graph.upsert_node(concept("b")).id.clone();

        let mut edge = Edge::new(&a, &b, "related");
        edge.valid_from = Some(Utc::now());
        edge.valid_until = Some(Utc::now() - chrono::Duration::days(1));
        assert!(graph.insert_edge(edge).is_err());
    }

    #[test]
    fn test_duplicate_allowed_with_different_window() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.upsert_node(concept("a")).id.clone();
        let b = graph.upsert_node(concept("b")).id.clone();

        let mut first = Edge::new(&a, &b, "related");
        first.valid_from = Some(Utc::now() - chrono::Duration::days(10));
        first.valid_until = Some(Utc::now() - chrono::Duration::days(5));
        assert!(graph.insert_edge(first).unwrap());

        let second = Edge::new(&a, &b, "related");
        assert!(graph.insert_edge(second).unwrap());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_neighbors_directions() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.upsert_node(concept("a")).id.clone();
        let b = graph.upsert_node(concept("b")).id.clone();
        let c = graph.upsert_node(concept("c")).id.clone();

        graph.insert_edge(Edge::new(&a, &b, "related")).unwrap();
        graph.insert_edge(Edge::new(&c, &a, "related")).unwrap();

        let out: Vec<_> = graph.neighbors(&a, Direction::Out).iter().map(|n| n.id.clone()).collect();
        assert_eq!(out, vec![b.clone()]);

        let inc: Vec<_> = graph.neighbors(&a, Direction::In).iter().map(|n| n.id.clone()).collect();
        assert_eq!(inc, vec![c.clone()]);

        let both = graph.neighbors(&a, Direction::Both);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn test_remove_session_tombstones() {
        let mut graph = KnowledgeGraph::new();
        let session = Node::new(NodeType::Session, "sess-1", "session one");
        let session_id = session.id.clone();
        graph.upsert_node(session);

        let turn = Node::new(NodeType::Turn, "sess-1/turn-1", "hello rust")
            .with_metadata("sessionId", serde_json::Value::String(session_id.clone()));
        let turn_id = turn.id.clone();
        graph.upsert_node(turn);

        let topic = graph.upsert_node(concept("rust")).id.clone();
        graph.insert_edge(Edge::new(&turn_id, &session_id, "child_of")).unwrap();
        graph.insert_edge(Edge::new(&turn_id, &topic, "mentions")).unwrap();

        let removed = graph.remove_session(&session_id);
        assert_eq!(removed.len(), 2);
        assert_eq!(graph.live_edges().count(), 0);
        // Tombstoned, not deleted
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.get_node(&turn_id).unwrap().is_tombstoned());
        // The concept survives
        assert!(!graph.get_node(&topic).unwrap().is_tombstoned());
    }

    #[test]
    fn test_upsert_preserves_created_at() {
        let mut graph = KnowledgeGraph::new();
        let first = graph.upsert_node(concept("rust")).created_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let node = graph.upsert_node(concept("rust"));
        assert_eq!(node.created_at, first);
        assert!(node.updated_at >= first);
    }

    #[test]
    fn test_stats() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.upsert_node(concept("a")).id.clone();
        let b = graph.upsert_node(concept("b")).id.clone();
        graph.upsert_node(Node::new(NodeType::Tool, "cargo", "build tool"));
        graph.insert_edge(Edge::new(&a, &b, "related")).unwrap();

        let stats = graph.stats();
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.live_edges, 1);
        assert_eq!(stats.nodes_by_type["concept"], 2);
        assert_eq!(stats.nodes_by_type["tool"], 1);
    }
}
