//! Complete user workflows through the substrate facade: ingest, remember,
//! query, assemble context, restart.

use chitragupta_core::{
    estimate_tokens, MemoryDispatch, MemorySubstrate, NodeType, SubstrateConfig,
};

#[tokio::test]
async fn ingest_remember_query_context_journey() {
    let dir = tempfile::tempdir().unwrap();
    let mut substrate = MemorySubstrate::open(SubstrateConfig::offline_at(dir.path())).unwrap();

    // A short working session
    substrate
        .ingest_turn("sess-7", "user", "The ingest worker crashes parsing src/ingest.rs")
        .await;
    substrate
        .ingest_turn(
            "sess-7",
            "assistant",
            "The ingest worker failed because the parser assumed UTF-8; fixed the parser to skip bad turns.",
        )
        .await;
    let dispatch = substrate
        .ingest_utterance("sess-7", "remember that we decided to skip malformed turns")
        .await;
    assert!(matches!(dispatch, MemoryDispatch::Remembered(_)));

    // Graph grew the session scope
    assert!(!substrate.graph().nodes_of_type(NodeType::Turn).is_empty());
    assert!(!substrate.graph().nodes_of_type(NodeType::Session).is_empty());

    // Query sees the ingested knowledge
    let results = substrate.query("why does the ingest worker crash", None).await;
    assert!(!results.is_empty());

    // Context assembly stays inside its budget and carries the decision
    let context = substrate.build_context(None, Some(2_000)).await;
    assert!(estimate_tokens(&context) <= 2_000);
    assert!(context.contains("skip malformed turns"));

    substrate.save();

    // Restart: persisted state comes back
    let reopened = MemorySubstrate::open(SubstrateConfig::offline_at(dir.path())).unwrap();
    assert_eq!(
        reopened.graph().node_count(),
        substrate.graph().node_count()
    );
    assert_eq!(reopened.smaran().len(), 1);
}

#[tokio::test]
async fn session_removal_journey() {
    let dir = tempfile::tempdir().unwrap();
    let mut substrate = MemorySubstrate::open(SubstrateConfig::offline_at(dir.path())).unwrap();

    substrate
        .ingest_turn("keep", "user", "notes about postgres indexes and query planning")
        .await;
    substrate
        .ingest_turn("drop", "user", "random chatter about kafka partitions")
        .await;

    let live_before = substrate.graph().live_edges().count();
    substrate.remove_session("drop");
    let live_after = substrate.graph().live_edges().count();
    assert!(live_after < live_before);

    // Tombstones persist across a save/load cycle
    substrate.save();
    let reopened = MemorySubstrate::open(SubstrateConfig::offline_at(dir.path())).unwrap();
    assert_eq!(reopened.graph().live_edges().count(), live_after);
    assert!(reopened.graph().edge_count() > live_after);
}

#[tokio::test]
async fn communities_emerge_from_distinct_topics() {
    let dir = tempfile::tempdir().unwrap();
    let mut substrate = MemorySubstrate::open(SubstrateConfig::offline_at(dir.path())).unwrap();

    for _ in 0..2 {
        substrate
            .ingest_turn("rust-sess", "user", "rust tokio cargo and clippy workflow notes")
            .await;
        substrate
            .ingest_turn("data-sess", "user", "postgres redis kafka pipeline tuning")
            .await;
    }

    let result = substrate.communities();
    assert!(result.community_list.len() >= 2);
    assert!(result.modularity >= 0.0);
}
