//! Graph and session builders shared across the e2e suites.

use chitragupta_core::{node_id, Edge, KnowledgeGraph, Node, NodeType, Session, ToolCall, Turn};
use chrono::{DateTime, Utc};

/// Concept node id for a label
pub fn cid(label: &str) -> String {
    node_id(NodeType::Concept, label)
}

/// Build a graph of two strong 3-cliques joined by one weak bridge
/// (`a3 -> b1` at weight 0.1).
pub fn two_clique_graph() -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new();
    for label in ["a1", "a2", "a3", "b1", "b2", "b3"] {
        graph.upsert_node(Node::new(NodeType::Concept, label, ""));
    }
    for (u, v) in [
        ("a1", "a2"),
        ("a2", "a3"),
        ("a1", "a3"),
        ("b1", "b2"),
        ("b2", "b3"),
        ("b1", "b3"),
    ] {
        graph
            .insert_edge(Edge::new(cid(u), cid(v), "related"))
            .expect("clique edge");
    }
    graph
        .insert_edge(Edge::new(cid("a3"), cid("b1"), "related").with_weight(0.1))
        .expect("bridge edge");
    graph
}

/// Build the triangle `A -> B -> C -> A`.
pub fn triangle_graph() -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new();
    for label in ["A", "B", "C"] {
        graph.upsert_node(Node::new(NodeType::Concept, label, ""));
    }
    for (u, v) in [("A", "B"), ("B", "C"), ("C", "A")] {
        graph
            .insert_edge(Edge::new(cid(u), cid(v), "related"))
            .expect("triangle edge");
    }
    graph
}

fn timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("fixture timestamp")
        .with_timezone(&Utc)
}

/// A session with tool calls, multiline content, and full frontmatter.
pub fn sample_session() -> Session {
    Session {
        id: "sess-fixture-01".to_string(),
        title: "Pipeline triage".to_string(),
        created: timestamp("2026-03-02T08:00:00.000Z"),
        updated: timestamp("2026-03-02T08:45:30.250Z"),
        agent: Some("chitragupta".to_string()),
        model: Some("llama3.2".to_string()),
        project: Some("substrate".to_string()),
        parent: Some("sess-root".to_string()),
        branch: Some("main".to_string()),
        tags: vec!["triage".to_string(), "pipeline".to_string()],
        total_cost: Some(1.25),
        total_tokens: Some(52_100),
        turns: vec![
            Turn {
                role: "user".to_string(),
                agent: None,
                model: None,
                content: "The nightly consolidation job is stuck.\n\nCan you look?".to_string(),
                tool_calls: vec![],
            },
            Turn {
                role: "assistant".to_string(),
                agent: Some("ops".to_string()),
                model: Some("llama3.2".to_string()),
                content: "Checking the job logs now.".to_string(),
                tool_calls: vec![ToolCall {
                    name: "run-shell".to_string(),
                    input: serde_json::json!({"cmd": "journalctl -u consolidation --since today"}),
                    outcome: chitragupta_core::ToolOutcome::Result(
                        "job waiting on a poisoned lock since 02:14".to_string(),
                    ),
                }],
            },
        ],
    }
}
