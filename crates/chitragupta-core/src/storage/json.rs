//! Legacy JSON Codecs
//!
//! File formats from the JSON-backed era: `graph.json` holds
//! `{nodes: [...], edges: [...]}`, `pagerank.json` a flat node-to-score
//! map. These are read during the one-shot migration and can still be
//! written as a secondary snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::graph::{Edge, KnowledgeGraph, Node};

use super::Result;

/// Serialized shape of `graph.json`
#[derive(Debug, Serialize, Deserialize)]
struct GraphJson {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Read a legacy `graph.json` file into a graph. Edges with missing
/// endpoints or invalid temporal windows are skipped with a warning.
pub fn read_graph_json(path: &Path) -> Result<KnowledgeGraph> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: GraphJson = serde_json::from_str(&raw)?;

    let mut graph = KnowledgeGraph::new();
    for node in parsed.nodes {
        graph.upsert_node(node);
    }
    for edge in parsed.edges {
        match graph.insert_edge(edge) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("legacy edge skipped (endpoint or duplicate)"),
            Err(e) => tracing::warn!("legacy edge rejected: {}", e),
        }
    }
    Ok(graph)
}

/// Write a graph snapshot in the legacy format.
pub fn write_graph_json(path: &Path, graph: &KnowledgeGraph) -> Result<()> {
    let snapshot = GraphJson {
        nodes: graph.iterate_nodes().cloned().collect(),
        edges: graph.iterate_edges().cloned().collect(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
    Ok(())
}

/// Read a legacy `pagerank.json` score map.
pub fn read_pagerank_json(path: &Path) -> Result<HashMap<String, f64>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write a PageRank score map in the legacy format.
pub fn write_pagerank_json(path: &Path, scores: &HashMap<String, f64>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(scores)?)?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;

    #[test]
    fn test_graph_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let mut graph = KnowledgeGraph::new();
        let a = graph
            .upsert_node(Node::new(NodeType::Concept, "alpha", "first"))
            .id
            .clone();
        let b = graph
            .upsert_node(Node::new(NodeType::Concept, "beta", "second"))
            .id
            .clone();
        graph.insert_edge(Edge::new(&a, &b, "related")).unwrap();

        write_graph_json(&path, &graph).unwrap();
        let loaded = read_graph_json(&path).unwrap();

        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.live_edges().count(), 1);
        assert_eq!(loaded.get_node(&a).unwrap().content, "first");
    }

    #[test]
    fn test_graph_json_skips_dangling_edges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{
                "nodes": [{
                    "id": "concept-1", "type": "concept", "label": "a", "content": "",
                    "metadata": {},
                    "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z"
                }],
                "edges": [{
                    "source": "concept-1", "target": "missing",
                    "relationship": "related", "weight": 1.0
                }]
            }"#,
        )
        .unwrap();

        let loaded = read_graph_json(&path).unwrap();
        assert_eq!(loaded.node_count(), 1);
        assert_eq!(loaded.edge_count(), 0);
    }

    #[test]
    fn test_pagerank_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagerank.json");

        let mut scores = HashMap::new();
        scores.insert("concept-1".to_string(), 0.7);
        scores.insert("concept-2".to_string(), 0.3);

        write_pagerank_json(&path, &scores).unwrap();
        assert_eq!(read_pagerank_json(&path).unwrap(), scores);
    }

    #[test]
    fn test_malformed_graph_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, "nope").unwrap();
        assert!(read_graph_json(&path).is_err());
    }
}
