//! Heuristic NER
//!
//! Regex and dictionary recognition for the entity kinds that matter to the
//! graph: file paths, error strings, technologies, tools, decisions,
//! actions, and organizations. Runs without a provider and enriches
//! whatever the primary path produced.

use std::sync::LazyLock;

use regex::Regex;

use crate::graph::NodeType;

use super::Entity;

// ============================================================================
// PATTERN TABLES
// ============================================================================

static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w./-]+\.(?:rs|ts|tsx|js|jsx|py|go|java|c|cc|cpp|h|hpp|md|json|toml|yaml|yml|sql|sh|txt)\b")
        .expect("file path pattern")
});

static ERROR_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z]\w*(?:Error|Exception|Panic))\b|\berror:\s*([^\n.]{3,60})")
        .expect("error pattern")
});

static DECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdecided\s+to\s+([^.!?\n]{3,60})").expect("decision pattern")
});

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:implemented|fixed|refactored|deployed|migrated|upgraded)\s+(?:the\s+)?([\w-]{3,40})")
        .expect("action pattern")
});

static ORGANIZATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*\s+(?:Inc|Corp|Labs|Ltd|LLC|GmbH|Foundation))\b")
        .expect("organization pattern")
});

/// Technology dictionary; matched as whole lowercase words
const TECHNOLOGIES: &[&str] = &[
    "rust", "python", "typescript", "javascript", "java", "kotlin", "swift",
    "react", "vue", "svelte", "node", "deno", "tokio", "wasm",
    "docker", "kubernetes", "terraform", "nginx", "haproxy",
    "postgres", "postgresql", "sqlite", "mysql", "redis", "kafka",
    "elasticsearch", "mongodb", "graphql", "grpc", "ollama", "llama",
];

/// Tool dictionary; matched as whole lowercase words
const TOOLS: &[&str] = &[
    "cargo", "rustc", "clippy", "npm", "yarn", "pnpm", "pip", "uv", "poetry",
    "git", "make", "cmake", "bazel", "grep", "curl", "ssh", "tmux", "vim",
];

// ============================================================================
// RECOGNITION
// ============================================================================

/// Run the heuristic NER sweep over text.
pub fn ner_entities(text: &str) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    let mut push = |entity: Entity| {
        if !entities
            .iter()
            .any(|e: &Entity| e.name.eq_ignore_ascii_case(&entity.name))
        {
            entities.push(entity);
        }
    };

    for m in FILE_PATH.find_iter(text) {
        push(Entity::new(m.as_str(), NodeType::File, "file path"));
    }

    for caps in ERROR_STRING.captures_iter(text) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            push(Entity::new(m.as_str().trim(), NodeType::Concept, "error"));
        }
    }

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    for &tech in TECHNOLOGIES {
        if words.contains(&tech) {
            push(Entity::new(tech, NodeType::Concept, "technology"));
        }
    }
    for &tool in TOOLS {
        if words.contains(&tool) {
            push(Entity::new(tool, NodeType::Tool, "tool"));
        }
    }

    for caps in DECISION.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(Entity::new(m.as_str().trim(), NodeType::Concept, "decision"));
        }
    }

    for caps in ACTION.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(Entity::new(m.as_str().trim(), NodeType::Concept, "action"));
        }
    }

    for caps in ORGANIZATION.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(Entity::new(m.as_str().trim(), NodeType::Organization, "organization"));
        }
    }

    entities
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_paths() {
        let entities = ner_entities("edit src/graph/mod.rs and Cargo.toml before the release");
        assert!(entities
            .iter()
            .any(|e| e.name == "src/graph/mod.rs" && e.entity_type == NodeType::File));
        assert!(entities.iter().any(|e| e.name == "cargo.toml"));
    }

    #[test]
    fn test_error_strings() {
        let entities = ner_entities("the job died with a TimeoutError after retrying");
        assert!(entities.iter().any(|e| e.name == "timeouterror"));

        let entities = ner_entities("logs show error: connection refused by upstream");
        assert!(entities
            .iter()
            .any(|e| e.name.contains("connection refused")));
    }

    #[test]
    fn test_technology_and_tool_dictionaries() {
        let entities = ner_entities("We run Postgres behind nginx and build with cargo.");
        assert!(entities
            .iter()
            .any(|e| e.name == "postgres" && e.entity_type == NodeType::Concept));
        assert!(entities.iter().any(|e| e.name == "nginx"));
        assert!(entities
            .iter()
            .any(|e| e.name == "cargo" && e.entity_type == NodeType::Tool));
    }

    #[test]
    fn test_decisions_and_actions() {
        let entities = ner_entities("We decided to split the ingest pipeline. Later we refactored the scheduler.");
        assert!(entities
            .iter()
            .any(|e| e.description == "decision" && e.name.contains("split the ingest")));
        assert!(entities
            .iter()
            .any(|e| e.description == "action" && e.name == "scheduler"));
    }

    #[test]
    fn test_organizations() {
        let entities = ner_entities("The contract with Acme Corp covers hosting; Redwood Labs audits it.");
        assert!(entities
            .iter()
            .any(|e| e.name == "acme corp" && e.entity_type == NodeType::Organization));
        assert!(entities.iter().any(|e| e.name == "redwood labs"));
    }

    #[test]
    fn test_no_false_positives_on_plain_text() {
        let entities = ner_entities("a quiet sentence about nothing in particular");
        assert!(entities.is_empty());
    }
}
