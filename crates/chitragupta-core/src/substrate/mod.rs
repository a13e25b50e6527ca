//! Memory Substrate
//!
//! The facade tying the subsystems together: ingestion feeds the graph and
//! triggers extraction, embedding, and incremental PageRank updates; queries
//! run through the multi-round planner and the hybrid retrieval engine;
//! context assembly splits a token budget across the four memory streams.
//!
//! All provider I/O happens before any store mutation, so cancelling a
//! suspended ingestion or query leaves every store unchanged.

use serde_json::json;

use crate::budget::{allocate_budgets, StreamSignals};
use crate::config::SubstrateConfig;
use crate::embeddings::EmbeddingService;
use crate::extract::EntityExtractor;
use crate::graph::community::{partition, PartitionResult};
use crate::graph::incremental::IncrementalPageRank;
use crate::graph::{Edge, KnowledgeGraph, Node, NodeType, WEIGHT_BRIDGE};
use crate::providers::ProviderClient;
use crate::retrieval::chunking::{chunk_text, CHUNK_TOKEN_LIMIT};
use crate::retrieval::planner::{decompose, fuse, plan_followups, FusedResult, SubQuery};
use crate::retrieval::{RetrievalEngine, RetrievedNode};
use crate::scoring::estimate_tokens;
use crate::smaran::intent::{detect_memory_intent, MemoryAction};
use crate::smaran::{MemoryEntry, RememberOptions, SmaranStore};
use crate::storage::{Result as StorageResult, SqliteStore};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Summary of a single turn ingestion
#[derive(Debug, Clone)]
pub struct TurnIngest {
    /// Id of the created turn node
    pub turn_id: String,
    /// Entities linked from the turn
    pub entity_count: usize,
    /// Edges added to the graph
    pub edge_count: usize,
}

/// Outcome of dispatching an utterance through the memory NLU
#[derive(Debug, Clone)]
pub enum MemoryDispatch {
    /// A memory was stored (or reasserted)
    Remembered(MemoryEntry),
    /// Matching memories were removed
    Forgot(usize),
    /// Matching memories were recalled with scores
    Recalled(Vec<(MemoryEntry, f64)>),
    /// All memories were listed
    Listed(Vec<MemoryEntry>),
    /// The utterance carried no memory intent
    NotMemory,
}

// ============================================================================
// SUBSTRATE
// ============================================================================

/// The assembled memory substrate
pub struct MemorySubstrate {
    config: SubstrateConfig,
    graph: KnowledgeGraph,
    pagerank: IncrementalPageRank,
    embeddings: EmbeddingService,
    extractor: EntityExtractor,
    retrieval: RetrievalEngine,
    smaran: SmaranStore,
    store: Option<SqliteStore>,
}

impl MemorySubstrate {
    /// Open the substrate with persistence under the configured home.
    ///
    /// Load order: SQLite first (migrating legacy JSON when the database is
    /// empty), then the embedding cache trimmed to capacity, then the
    /// incremental PageRank engine seeded from the persisted scores.
    pub fn open(config: SubstrateConfig) -> StorageResult<Self> {
        let mut store = SqliteStore::open(config.home.graph_db())?;
        store.migrate_from_json(&config.home.graph_json(), &config.home.pagerank_json())?;
        let (graph, persisted) = store.load_graph()?;

        let embeddings = EmbeddingService::new(config.embedding.clone());
        if let Err(e) = embeddings.load(&config.home.embeddings_json()) {
            tracing::warn!("embedding cache load failed: {}", e);
        }

        let mut smaran = SmaranStore::with_config(config.smaran.clone());
        if let Err(e) = smaran.load_from_dir(&config.home.smaran_dir()) {
            tracing::warn!("smaran load failed: {}", e);
        }

        let pagerank = IncrementalPageRank::from_graph(&graph, &persisted);
        let extractor = Self::build_extractor(&config, &embeddings);

        Ok(Self {
            retrieval: RetrievalEngine::with_config(config.retrieval.clone()),
            config,
            graph,
            pagerank,
            embeddings,
            extractor,
            smaran,
            store: Some(store),
        })
    }

    /// Fully in-memory substrate (tests, ephemeral sessions)
    pub fn in_memory(config: SubstrateConfig) -> Self {
        let embeddings = EmbeddingService::new(config.embedding.clone());
        let extractor = Self::build_extractor(&config, &embeddings);
        Self {
            retrieval: RetrievalEngine::with_config(config.retrieval.clone()),
            smaran: SmaranStore::with_config(config.smaran.clone()),
            config,
            graph: KnowledgeGraph::new(),
            pagerank: IncrementalPageRank::new(),
            embeddings,
            extractor,
            store: None,
        }
    }

    fn build_extractor(config: &SubstrateConfig, _embeddings: &EmbeddingService) -> EntityExtractor {
        match &config.embedding.provider {
            Some(provider) => EntityExtractor::new(Some(ProviderClient::new(provider.clone()))),
            None => EntityExtractor::offline(),
        }
    }

    /// The knowledge graph
    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Current PageRank scores
    pub fn pagerank(&self) -> &IncrementalPageRank {
        &self.pagerank
    }

    /// The smaran store
    pub fn smaran(&self) -> &SmaranStore {
        &self.smaran
    }

    /// Mutable smaran access for direct memory management
    pub fn smaran_mut(&mut self) -> &mut SmaranStore {
        &mut self.smaran
    }

    /// The embedding service
    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Ingest a conversation turn: create session and turn nodes, extract
    /// and link entities, and push the edge deltas through incremental
    /// PageRank.
    pub async fn ingest_turn(
        &mut self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> TurnIngest {
        // Suspend first, mutate after: a cancelled ingestion changes nothing
        self.embeddings.embed(content).await;
        // Long content also embeds per semantic chunk so retrieval can match
        // material from the middle of a turn
        if estimate_tokens(content) >= CHUNK_TOKEN_LIMIT {
            for chunk in chunk_text(content) {
                self.embeddings.embed(&chunk.text).await;
            }
        }
        let entities = self.extractor.extract(content).await;

        let session_node_id = crate::graph::node_id(NodeType::Session, session_id);
        if self.graph.get_node(&session_node_id).is_none() {
            self.graph
                .upsert_node(Node::new(NodeType::Session, session_id, ""));
        }

        let turn_index = self
            .graph
            .nodes_of_type(NodeType::Turn)
            .iter()
            .filter(|n| {
                n.metadata
                    .get("sessionId")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| s == session_node_id)
            })
            .count()
            + 1;
        let turn_label = format!("{}#turn-{}", session_id, turn_index);
        let turn = Node::new(NodeType::Turn, &turn_label, content)
            .with_metadata("sessionId", json!(session_node_id))
            .with_metadata("role", json!(role));
        let turn_id = turn.id.clone();
        self.graph.upsert_node(turn);

        let mut edge_count = 0usize;
        edge_count += self.link(&turn_id, &session_node_id, "child_of", 1.0);

        let mut entity_ids: Vec<String> = Vec::new();
        for entity in &entities {
            let node = Node::new(entity.entity_type, &entity.name, &entity.description);
            let entity_id = node.id.clone();
            if self.graph.get_node(&entity_id).is_none() {
                self.graph.upsert_node(node);
            }
            edge_count += self.link(&turn_id, &entity_id, "mentions", 1.0);
            entity_ids.push(entity_id);
        }

        // Weak co-mention bridges between entities of the same turn
        for pair in entity_ids.windows(2) {
            edge_count += self.link(&pair[0], &pair[1], "related", WEIGHT_BRIDGE);
        }

        TurnIngest {
            turn_id,
            entity_count: entities.len(),
            edge_count,
        }
    }

    /// Insert an edge and mirror it into the incremental PageRank engine.
    fn link(&mut self, source: &str, target: &str, relationship: &str, weight: f64) -> usize {
        let edge = Edge::new(source, target, relationship)
            .with_weight(weight)
            .with_pramana("ingest");
        match self.graph.insert_edge(edge) {
            Ok(true) => {
                self.pagerank.add_edge(source, target);
                1
            }
            Ok(false) => 0,
            Err(e) => {
                tracing::warn!("edge rejected: {}", e);
                0
            }
        }
    }

    /// Dispatch an utterance through the memory NLU. Remember intents also
    /// land in the graph as memory nodes derived from the session.
    pub async fn ingest_utterance(&mut self, session_id: &str, utterance: &str) -> MemoryDispatch {
        let Some(intent) = detect_memory_intent(utterance) else {
            return MemoryDispatch::NotMemory;
        };

        match intent.action {
            MemoryAction::Remember => {
                let Some(content) = intent.content else {
                    return MemoryDispatch::NotMemory;
                };
                let category = intent.category.unwrap_or_default();
                // Embed before touching stores
                self.embeddings.embed(&content).await;

                let entry = self.smaran.remember(
                    &content,
                    category,
                    RememberOptions {
                        session_id: Some(session_id.to_string()),
                        ..Default::default()
                    },
                );

                let session_node_id = crate::graph::node_id(NodeType::Session, session_id);
                if self.graph.get_node(&session_node_id).is_none() {
                    self.graph
                        .upsert_node(Node::new(NodeType::Session, session_id, ""));
                }
                let memory_node = Node::new(NodeType::Memory, &entry.id, &entry.content)
                    .with_metadata("category", json!(entry.category.as_str()));
                let memory_id = memory_node.id.clone();
                self.graph.upsert_node(memory_node);
                self.link(&memory_id, &session_node_id, "derived_from", 1.0);

                MemoryDispatch::Remembered(entry)
            }
            MemoryAction::Forget => {
                let Some(query) = intent.query else {
                    return MemoryDispatch::Forgot(0);
                };
                let removed = self.smaran.forget_by_content(&query);
                MemoryDispatch::Forgot(removed)
            }
            MemoryAction::Recall => {
                let query = intent.query.unwrap_or_default();
                MemoryDispatch::Recalled(self.smaran.recall(&query, None))
            }
            MemoryAction::List => {
                MemoryDispatch::Listed(self.smaran.list_all().into_iter().cloned().collect())
            }
        }
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    /// Multi-round retrieval: decompose, execute, follow up on uncovered
    /// key terms, and fuse.
    pub async fn query(&self, question: &str, limit: Option<usize>) -> Vec<FusedResult> {
        let limit = limit.unwrap_or(self.config.retrieval.top_k);
        let plan = decompose(question, &self.config.planner);

        let mut rounds: Vec<(SubQuery, Vec<RetrievedNode>)> = Vec::new();
        for sub_query in plan {
            let results = self.run_sub_query(&sub_query).await;
            rounds.push((sub_query, results));
        }

        let executed: Vec<SubQuery> = rounds.iter().map(|(q, _)| q.clone()).collect();
        let seen: Vec<RetrievedNode> = rounds
            .iter()
            .flat_map(|(_, results)| results.iter().cloned())
            .collect();
        for follow_up in plan_followups(question, &executed, &seen, &self.config.planner) {
            let results = self.run_sub_query(&follow_up).await;
            rounds.push((follow_up, results));
        }

        fuse(&rounds, limit)
    }

    async fn run_sub_query(&self, sub_query: &SubQuery) -> Vec<RetrievedNode> {
        self.retrieval
            .search(
                &self.graph,
                self.pagerank.ranks(),
                &self.embeddings,
                &sub_query.text,
                Some(self.config.retrieval.top_k),
            )
            .await
    }

    /// Detect communities over the current graph.
    pub fn communities(&self) -> PartitionResult {
        partition(&self.graph, &self.config.leiden)
    }

    // ------------------------------------------------------------------
    // Context assembly
    // ------------------------------------------------------------------

    /// Assemble a context block across the four memory streams under a
    /// token budget.
    pub async fn build_context(&self, query: Option<&str>, budget: Option<usize>) -> String {
        let total = budget.unwrap_or(self.config.context_budget);

        let identity: Vec<String> = self
            .smaran
            .list_by_category(crate::smaran::MemoryCategory::Preference)
            .iter()
            .chain(
                self.smaran
                    .list_by_category(crate::smaran::MemoryCategory::Fact)
                    .iter(),
            )
            .map(|e| e.content.clone())
            .collect();
        let projects: Vec<String> = self
            .graph
            .nodes_of_type(NodeType::File)
            .iter()
            .chain(self.graph.nodes_of_type(NodeType::Tool).iter())
            .filter(|n| !n.is_tombstoned())
            .map(|n| n.label.clone())
            .collect();
        let tasks: Vec<String> = self
            .smaran
            .list_by_category(crate::smaran::MemoryCategory::Decision)
            .iter()
            .chain(
                self.smaran
                    .list_by_category(crate::smaran::MemoryCategory::Instruction)
                    .iter(),
            )
            .map(|e| e.content.clone())
            .collect();
        let flow: Vec<String> = match query {
            Some(q) => self
                .query(q, Some(8))
                .await
                .into_iter()
                .map(|r| r.node.content)
                .collect(),
            None => {
                let mut turns = self.graph.nodes_of_type(NodeType::Turn);
                turns.retain(|n| !n.is_tombstoned());
                turns.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                turns.into_iter().take(8).map(|n| n.content.clone()).collect()
            }
        };

        let signals = StreamSignals {
            identity: identity.clone(),
            projects: projects.clone(),
            tasks: tasks.clone(),
            flow: flow.clone(),
        };
        let budgets = allocate_budgets(&signals, total);

        let mut out = String::new();
        let streams = [
            ("Identity", identity, budgets[0]),
            ("Projects", projects, budgets[1]),
            ("Tasks", tasks, budgets[2]),
            ("Flow", flow, budgets[3]),
        ];
        for (title, lines, stream_budget) in streams {
            if lines.is_empty() || stream_budget == 0 {
                continue;
            }
            let mut section = format!("## {}\n", title);
            let mut used = estimate_tokens(&section);
            for line in lines {
                let rendered = format!("- {}\n", line);
                let cost = estimate_tokens(&rendered);
                if used + cost > stream_budget {
                    break;
                }
                section.push_str(&rendered);
                used += cost;
            }
            if section.lines().count() > 1 {
                out.push_str(&section);
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }

    // ------------------------------------------------------------------
    // Removal & persistence
    // ------------------------------------------------------------------

    /// Tombstone a session scope and update PageRank.
    pub fn remove_session(&mut self, session_id: &str) {
        let session_node_id = crate::graph::node_id(NodeType::Session, session_id);
        for (source, target) in self.graph.remove_session(&session_node_id) {
            self.pagerank.remove_edge(&source, &target);
        }
    }

    /// Tombstone a memory scope and update PageRank.
    pub fn remove_memory(&mut self, memory_node_id: &str) {
        for (source, target) in self.graph.remove_memory(memory_node_id) {
            self.pagerank.remove_edge(&source, &target);
        }
    }

    /// Full PageRank recompute; used after bulk compaction.
    pub fn recompute_pagerank(&mut self) {
        self.pagerank.recompute(&self.graph);
    }

    /// Persist graph, PageRank, embedding cache, and smaran entries.
    /// Failures log and leave the in-memory state authoritative.
    pub fn save(&mut self) {
        if let Some(store) = &mut self.store {
            if let Err(e) = store.save_graph(&self.graph, self.pagerank.ranks()) {
                tracing::warn!("graph save failed, in-memory state retained: {}", e);
            }
        }
        if let Err(e) = self.embeddings.flush(&self.config.home.embeddings_json()) {
            tracing::warn!("embedding cache flush failed: {}", e);
        }
        if let Err(e) = self.smaran.save_to_dir(&self.config.home.smaran_dir()) {
            tracing::warn!("smaran save failed: {}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
