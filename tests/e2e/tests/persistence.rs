//! Persistence and migration coverage: SQLite rewrites, legacy JSON
//! migration, and embedding-cache reload order.

use std::collections::HashMap;

use chitragupta_core::storage::{json, SqliteStore};
use chitragupta_core::{
    Edge, EmbeddingConfig, EmbeddingService, IncrementalPageRank, KnowledgeGraph, Node, NodeType,
    compute_pagerank, node_id, PageRankOptions,
};

fn seeded_graph() -> (KnowledgeGraph, HashMap<String, f64>) {
    let mut graph = KnowledgeGraph::new();
    let ids: Vec<String> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|label| {
            graph
                .upsert_node(Node::new(NodeType::Concept, *label, format!("notes on {}", label)))
                .id
                .clone()
        })
        .collect();
    graph.insert_edge(Edge::new(&ids[0], &ids[1], "related")).unwrap();
    graph.insert_edge(Edge::new(&ids[1], &ids[2], "related")).unwrap();
    let pagerank = compute_pagerank(&graph, &PageRankOptions::default());
    (graph, pagerank)
}

#[test]
fn sqlite_roundtrip_preserves_graph_and_scores() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(dir.path().join("graph.db")).unwrap();
    let (graph, pagerank) = seeded_graph();

    store.save_graph(&graph, &pagerank).unwrap();
    let (loaded, loaded_pr) = store.load_graph().unwrap();

    assert_eq!(loaded.node_count(), graph.node_count());
    assert_eq!(loaded.live_edges().count(), graph.live_edges().count());
    for (id, score) in &pagerank {
        assert!((loaded_pr[id] - score).abs() < 1e-12);
    }
}

#[test]
fn legacy_json_migrates_once_and_renames() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.json");
    let pagerank_path = dir.path().join("pagerank.json");

    let (graph, pagerank) = seeded_graph();
    json::write_graph_json(&graph_path, &graph).unwrap();
    json::write_pagerank_json(&pagerank_path, &pagerank).unwrap();

    let mut store = SqliteStore::open(dir.path().join("graph.db")).unwrap();
    assert!(store.migrate_from_json(&graph_path, &pagerank_path).unwrap());
    assert!(dir.path().join("graph.json.bak").exists());
    assert!(!graph_path.exists());

    let (loaded, loaded_pr) = store.load_graph().unwrap();
    assert_eq!(loaded.node_count(), 3);
    assert_eq!(loaded_pr.len(), 3);

    // Second run: nothing to do, nothing broken
    assert!(!store.migrate_from_json(&graph_path, &pagerank_path).unwrap());
}

#[test]
fn incremental_engine_seeds_from_persisted_scores() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(dir.path().join("graph.db")).unwrap();
    let (graph, pagerank) = seeded_graph();
    store.save_graph(&graph, &pagerank).unwrap();

    let (loaded, persisted) = store.load_graph().unwrap();
    let engine = IncrementalPageRank::from_graph(&loaded, &persisted);

    let alpha = node_id(NodeType::Concept, "alpha");
    assert!((engine.score(&alpha) - pagerank[&alpha]).abs() < 1e-12);
}

#[tokio::test]
async fn embedding_cache_survives_flush_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.json");

    let service = EmbeddingService::new(EmbeddingConfig::offline());
    let first = service.embed("alpha centauri notes").await;
    let second = service.embed("beta pictoris notes").await;
    service.flush(&path).unwrap();

    let reloaded = EmbeddingService::new(EmbeddingConfig::offline());
    assert_eq!(reloaded.load(&path).unwrap(), 2);
    assert_eq!(reloaded.cached("alpha centauri notes"), Some(first));
    assert_eq!(reloaded.cached("beta pictoris notes"), Some(second));
}

#[tokio::test]
async fn cache_reload_trims_to_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.json");

    let big = EmbeddingService::new(EmbeddingConfig::offline());
    for i in 0..20 {
        big.embed(&format!("entry number {}", i)).await;
    }
    big.flush(&path).unwrap();

    let small = EmbeddingService::new(EmbeddingConfig {
        cache_capacity: 5,
        ..EmbeddingConfig::offline()
    });
    let loaded = small.load(&path).unwrap();
    assert_eq!(loaded, 5);
    assert!(small.cache_len() <= 5);
}
