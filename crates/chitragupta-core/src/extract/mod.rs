//! Entity Extraction
//!
//! Turns free text into `(name, type, description)` entities. The primary
//! path asks the generation provider for a JSON array; offline, a keyword
//! frequency pass stands in. A heuristic NER sweep (file paths, errors,
//! technology and tool dictionaries, decisions, organizations) always runs
//! and merges into the result by case-insensitive name.

pub mod ner;

use serde::Deserialize;

use crate::graph::NodeType;
use crate::providers::ProviderClient;
use crate::scoring::{is_stop_word, tokenize};

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// An extracted entity
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Lowercased, trimmed name
    pub name: String,
    /// Mapped into the graph's closed node-type set
    pub entity_type: NodeType,
    /// Short description of how the entity appeared
    pub description: String,
}

impl Entity {
    /// Create an entity, canonicalizing the name
    pub fn new(name: &str, entity_type: NodeType, description: impl Into<String>) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            entity_type,
            description: description.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    description: Option<String>,
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Keyword-fallback limits
const KEYWORD_MIN_LENGTH: usize = 5;
const KEYWORD_MIN_COUNT: usize = 2;
const KEYWORD_TOP_K: usize = 20;

/// Entity extractor with provider-primary and keyword-fallback paths
#[derive(Debug, Default)]
pub struct EntityExtractor {
    client: Option<ProviderClient>,
}

impl EntityExtractor {
    /// Extractor with a generation provider
    pub fn new(client: Option<ProviderClient>) -> Self {
        Self { client }
    }

    /// Extractor with no provider; always uses the keyword fallback
    pub fn offline() -> Self {
        Self { client: None }
    }

    /// Extract entities from text. Provider failures fall back to keyword
    /// extraction; the NER sweep always merges in.
    pub async fn extract(&self, text: &str) -> Vec<Entity> {
        let mut entities = match &self.client {
            Some(client) => match client.generate(&extraction_prompt(text)).await {
                Ok(response) => {
                    let parsed = parse_entity_json(&response);
                    if parsed.is_empty() {
                        keyword_entities(text)
                    } else {
                        parsed
                    }
                }
                Err(e) => {
                    tracing::warn!("entity extraction provider failed: {}", e);
                    keyword_entities(text)
                }
            },
            None => keyword_entities(text),
        };

        merge_entities(&mut entities, ner::ner_entities(text));
        entities
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        "Extract the named entities from the text below. Respond with only a \
         JSON array of objects with fields \"name\", \"type\" (one of concept, \
         file, tool, person, organization), and \"description\".\n\nText:\n{}",
        text
    )
}

/// Parse the first `[ ... ]` block in a provider response. Items without a
/// name are discarded; missing types default to `concept`.
pub fn parse_entity_json(response: &str) -> Vec<Entity> {
    let Some(start) = response.find('[') else {
        return Vec::new();
    };
    let Some(end) = response[start..].rfind(']') else {
        return Vec::new();
    };
    let block = &response[start..start + end + 1];

    let raw: Vec<RawEntity> = match serde_json::from_str(block) {
        Ok(items) => items,
        Err(e) => {
            tracing::debug!("entity JSON parse failed: {}", e);
            return Vec::new();
        }
    };

    raw.into_iter()
        .filter_map(|item| {
            let name = item.name?;
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return None;
            }
            let entity_type = item
                .entity_type
                .map(|t| NodeType::parse_name(&t))
                .unwrap_or(NodeType::Concept);
            Some(Entity::new(
                trimmed,
                entity_type,
                item.description.unwrap_or_default(),
            ))
        })
        .collect()
}

/// Keyword fallback: terms of 5+ characters, outside the stop set, occurring
/// at least twice; top 20 by frequency.
pub fn keyword_entities(text: &str) -> Vec<Entity> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for token in tokenize(text) {
        if token.len() < KEYWORD_MIN_LENGTH || is_stop_word(&token) {
            continue;
        }
        match counts.iter_mut().find(|(t, _)| *t == token) {
            Some((_, n)) => *n += 1,
            None => counts.push((token, 1)),
        }
    }

    counts.retain(|(_, n)| *n >= KEYWORD_MIN_COUNT);
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(KEYWORD_TOP_K);

    counts
        .into_iter()
        .map(|(term, n)| {
            Entity::new(
                &term,
                NodeType::Concept,
                format!("keyword mentioned {} times", n),
            )
        })
        .collect()
}

/// Merge additional entities into a list by case-insensitive name.
fn merge_entities(entities: &mut Vec<Entity>, additional: Vec<Entity>) {
    for entity in additional {
        if !entities
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(&entity.name))
        {
            entities.push(entity);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
