//! End-to-end scenarios over the assembled subsystems: community detection,
//! incremental PageRank, hybrid retrieval, decomposition, budget allocation,
//! and memory dedup.

use chitragupta_e2e_tests::fixtures::{cid, sample_session, triangle_graph, two_clique_graph};

use chitragupta_core::{
    allocate_budgets, compute_pagerank, decompose, find_bridge_nodes, parse_markdown, partition,
    sinkhorn_knopp, write_markdown, EmbeddingConfig, EmbeddingService, Edge, IncrementalPageRank,
    KnowledgeGraph, LeidenConfig, MemoryCategory, Node, NodeType, PageRankOptions, PlannerConfig,
    RememberOptions, RetrievalEngine, SmaranStore, StreamSignals,
};

// ============================================================================
// S1: TWO-CLIQUE COMMUNITY DETECTION
// ============================================================================

#[test]
fn s1_two_clique_communities_and_bridges() {
    let graph = two_clique_graph();
    let result = partition(&graph, &LeidenConfig::default());

    let a_side = result.communities[&cid("a1")];
    assert_eq!(result.communities[&cid("a2")], a_side);
    assert_eq!(result.communities[&cid("a3")], a_side);

    let b_side = result.communities[&cid("b1")];
    assert_eq!(result.communities[&cid("b2")], b_side);
    assert_eq!(result.communities[&cid("b3")], b_side);
    assert_ne!(a_side, b_side);

    let bridges = find_bridge_nodes(&graph, &result, 2);
    let mut expected = vec![cid("a3"), cid("b1")];
    expected.sort();
    assert_eq!(bridges, expected);
}

// ============================================================================
// S2: INCREMENTAL PAGERANK ON A TRIANGLE
// ============================================================================

#[test]
fn s2_incremental_pagerank_tracks_recompute() {
    let mut graph = triangle_graph();
    let full = compute_pagerank(&graph, &PageRankOptions::default());

    // Symmetric cycle: every node near one third
    for label in ["A", "B", "C"] {
        assert!((full[&cid(label)] - 1.0 / 3.0).abs() < 1e-3);
    }

    let mut engine = IncrementalPageRank::from_graph(&graph, &full);
    graph
        .insert_edge(Edge::new(cid("C"), cid("B"), "related"))
        .unwrap();
    engine.add_edge(&cid("C"), &cid("B"));

    // B gains, A loses slightly
    assert!(engine.score(&cid("B")) > full[&cid("B")]);
    assert!(engine.score(&cid("A")) < full[&cid("A")]);

    // Within tolerance of a full recompute of the new graph
    let updated = compute_pagerank(&graph, &PageRankOptions::default());
    for label in ["A", "B", "C"] {
        let id = cid(label);
        assert!(
            (engine.score(&id) - updated[&id]).abs() <= 0.1,
            "node {}: incremental {} vs full {}",
            label,
            engine.score(&id),
            updated[&id]
        );
    }
}

// ============================================================================
// S3: HYBRID RETRIEVAL
// ============================================================================

#[tokio::test]
async fn s3_hybrid_retrieval_ranks_matching_memories() {
    let embeddings = EmbeddingService::new(EmbeddingConfig::offline());
    let mut graph = KnowledgeGraph::new();
    for (label, content) in [
        ("m1", "I love TypeScript for web development"),
        ("m2", "Python is great for data science"),
        ("m3", "TypeScript generics are very powerful features"),
    ] {
        embeddings.embed(content).await;
        graph.upsert_node(Node::new(NodeType::Memory, label, content));
    }
    let pagerank = compute_pagerank(&graph, &PageRankOptions::default());

    let results = RetrievalEngine::new()
        .search(&graph, &pagerank, &embeddings, "TypeScript", None)
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].content.contains("TypeScript"));
    let mentioning = results
        .iter()
        .filter(|r| r.content.contains("TypeScript"))
        .count();
    assert!(mentioning >= 2);
}

// ============================================================================
// S4: MULTI-ROUND DECOMPOSITION
// ============================================================================

#[test]
fn s4_compare_query_decomposes_with_descending_weights() {
    let plan = decompose(
        "Compare authentication and authorization",
        &PlannerConfig::default(),
    );

    assert_eq!(plan.len(), 3);
    assert_eq!(plan[0].text, "Compare authentication and authorization");
    assert_eq!(plan[0].weight, 1.0);
    assert_eq!(plan[1].text, "authentication");
    assert!(plan[1].weight <= 0.8);
    assert_eq!(plan[2].text, "authorization");
    assert!(plan[2].weight <= 0.6);
}

// ============================================================================
// S5: SINKHORN ALLOCATOR
// ============================================================================

#[test]
fn s5_budget_allocation_conserves_and_orders() {
    let signals = StreamSignals {
        identity: vec!["pref".to_string()],
        projects: vec!["p1".to_string(), "p2".to_string()],
        tasks: vec!["t".to_string()],
        flow: vec!["c".to_string()],
    };

    let budgets = allocate_budgets(&signals, 10_000);
    assert_eq!(budgets.iter().sum::<usize>(), 10_000);
    assert!(budgets[0] > budgets[3]);
}

#[test]
fn s5_sinkhorn_rows_and_columns_near_one() {
    let matrix = [
        [2.0, 0.3, 0.2, 0.1],
        [0.3, 1.4, 0.3, 0.2],
        [0.2, 0.3, 1.0, 0.3],
        [0.1, 0.2, 0.3, 0.6],
    ];
    let normalized = sinkhorn_knopp(&matrix);
    for row in &normalized {
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-4);
    }
    for j in 0..4 {
        let sum: f64 = (0..4).map(|i| normalized[i][j]).sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }
}

// ============================================================================
// S6: MEMORY DEDUP
// ============================================================================

#[test]
fn s6_overlapping_memories_dedup_and_boost() {
    let mut store = SmaranStore::new();
    store.remember(
        "I really like pizza and pasta",
        MemoryCategory::Preference,
        RememberOptions {
            confidence: Some(0.7),
            ..Default::default()
        },
    );
    let merged = store.remember(
        "I really like pizza and pasta too",
        MemoryCategory::Preference,
        RememberOptions::default(),
    );

    assert_eq!(store.len(), 1);
    assert!(merged.confidence > 0.7);
}

// ============================================================================
// P9: SESSION CODEC ROUND TRIP
// ============================================================================

#[test]
fn p9_session_markdown_roundtrip() {
    let session = sample_session();
    let parsed = parse_markdown(&write_markdown(&session)).unwrap();
    assert_eq!(parsed, session);
}
