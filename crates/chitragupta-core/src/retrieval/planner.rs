//! Multi-Round Query Planner
//!
//! Complex questions are split into weighted sub-queries; after the first
//! retrieval round, key terms from the original query that no result covers
//! become follow-up sub-queries. Scores from all rounds fuse by weighted
//! accumulation per node.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::RetrievedNode;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Planner limits
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Ceiling on sub-queries across all rounds
    pub max_sub_queries: usize,
    /// Weight assigned to gap-driven follow-ups
    pub followup_weight: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_sub_queries: 5,
            followup_weight: 0.6,
        }
    }
}

// ============================================================================
// SUB-QUERIES
// ============================================================================

/// A decomposed sub-query with its fusion weight
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    /// Query text
    pub text: String,
    /// Fusion weight in [0.4, 1.1]
    pub weight: f64,
}

/// A fused retrieval result across sub-queries
#[derive(Debug, Clone)]
pub struct FusedResult {
    /// Representative occurrence (the highest-scoring one)
    pub node: RetrievedNode,
    /// Weighted accumulated score
    pub fused_score: f64,
}

// ============================================================================
// PATTERN TABLES
// ============================================================================

static CONJUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:and|or|but|that|which|who|where|when|while|although)\b")
        .expect("conjunction pattern")
});

static TEMPORAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:yesterday|today|tomorrow|last week|last month|last year|recently|earlier|before|after|ago|since)\b")
        .expect("temporal pattern")
});

static COMPARATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bvs\b|\bversus\b|compared to|difference between)").expect("comparative pattern")
});

static CAUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:why|because|caused by|led to|due to)\b").expect("causal pattern")
});

static VERSUS_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:vs\.?|versus|compared to)\s+(.+)$").expect("versus pattern")
});

static COMPARE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^compare\s+(.+?)\s+(?:and|with|to)\s+(.+)$").expect("compare pattern")
});

static DIFFERENCE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)difference between\s+(.+?)\s+and\s+(.+)").expect("difference pattern")
});

/// Stop words for key-term extraction: lexical stop set plus pronouns,
/// auxiliaries, and wh-words.
const QUERY_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by", "from", "is", "it", "this", "that", "was", "are", "be",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "not", "no", "i", "you", "he", "she", "we", "they", "me", "him",
    "her", "them", "us", "my", "your", "his", "its", "our", "their", "am",
    "can", "may", "might", "must", "what", "when", "where", "who", "whom",
    "which", "why", "how", "tell", "show", "about", "please",
];

// ============================================================================
// COMPLEXITY GATE
// ============================================================================

/// Whether a query is complex enough to be worth decomposing.
pub fn is_complex(query: &str) -> bool {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.len() > 8 {
        return true;
    }
    if CONJUNCTION.is_match(query)
        || TEMPORAL.is_match(query)
        || COMPARATIVE.is_match(query)
        || CAUSAL.is_match(query)
    {
        return true;
    }
    if query.matches('"').count() >= 4 {
        return true;
    }
    let capitalized_non_initial = words
        .iter()
        .skip(1)
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();
    capitalized_non_initial >= 2
}

// ============================================================================
// DECOMPOSITION
// ============================================================================

/// Decompose a query into weighted sub-queries.
///
/// The original query is always first with weight 1.0. Patterns are checked
/// in order and the first match wins; simple queries come back as a single
/// sub-query.
pub fn decompose(query: &str, config: &PlannerConfig) -> Vec<SubQuery> {
    let query = query.trim();
    let mut sub_queries = vec![SubQuery {
        text: query.to_string(),
        weight: 1.0,
    }];

    if !is_complex(query) {
        return sub_queries;
    }

    let parts = decompose_parts(query);

    for (i, part) in parts.iter().enumerate() {
        let base = (1.0 - 0.2 * (i as f64 + 1.0)).max(0.4);
        let weight = base + specificity_bonus(part);
        sub_queries.push(SubQuery {
            text: part.clone(),
            weight,
        });
    }

    clamp_sub_queries(sub_queries, config.max_sub_queries)
}

/// Raw decomposition segments, original excluded.
fn decompose_parts(query: &str) -> Vec<String> {
    // 1. Comparative: "X vs Y", "X compared to Y", "compare X and Y"
    if let Some(caps) = COMPARE_SPLIT
        .captures(query)
        .or_else(|| VERSUS_SPLIT.captures(query))
    {
        return capture_pair(&caps, query);
    }

    // 2. "difference between X and Y"
    if let Some(caps) = DIFFERENCE_SPLIT.captures(query) {
        return capture_pair(&caps, query);
    }

    // 3. Causal split
    if CAUSAL.is_match(query) {
        let segments: Vec<String> = CAUSAL
            .split(query)
            .map(str::trim)
            .filter(|s| s.len() >= 3 && !s.eq_ignore_ascii_case(query))
            .map(|s| s.trim_matches(|c: char| c == ',' || c == '?').trim().to_string())
            .filter(|s| s.len() >= 3)
            .collect();
        if !segments.is_empty() {
            return segments;
        }
    }

    // 4. Comma-separated entity list ending in and/or
    if query.contains(',') {
        let normalized = query.trim_end_matches(['?', '.', '!']);
        let mut entities: Vec<String> = Vec::new();
        let mut saw_closing_conjunction = false;
        for piece in normalized.split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            // The final piece carries the closing conjunction
            let mut rest = piece;
            for prefix in ["and ", "or "] {
                if rest.len() > prefix.len() && rest.to_lowercase().starts_with(prefix) {
                    rest = &rest[prefix.len()..];
                    saw_closing_conjunction = true;
                }
            }
            entities.push(rest.trim().to_string());
        }
        let looks_like_list = saw_closing_conjunction
            && entities.len() >= 2
            && entities.iter().all(|e| e.split_whitespace().count() <= 4);
        if looks_like_list {
            return entities;
        }
    }

    // 5. Conjunction split
    CONJUNCTION
        .split(query)
        .map(str::trim)
        .map(|s| s.trim_matches(|c: char| c == ',' || c == '?').trim())
        .filter(|s| s.len() >= 3 && !s.eq_ignore_ascii_case(query))
        .map(|s| s.to_string())
        .collect()
}

fn capture_pair(caps: &regex::Captures<'_>, query: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for i in [1, 2] {
        if let Some(m) = caps.get(i) {
            let cleaned = m
                .as_str()
                .trim()
                .trim_matches(|c: char| c == '?' || c == '.' || c == ',')
                .trim()
                .to_string();
            if !cleaned.is_empty() && !cleaned.eq_ignore_ascii_case(query) {
                parts.push(cleaned);
            }
        }
    }
    parts
}

/// Specificity bonus by token count: 0.0 for 1-2, 0.05 for 3-4, 0.10 for 5+.
fn specificity_bonus(text: &str) -> f64 {
    match text.split_whitespace().count() {
        0..=2 => 0.0,
        3..=4 => 0.05,
        _ => 0.10,
    }
}

/// Clamp to the sub-query ceiling, keeping the original plus the heaviest
/// remainder.
fn clamp_sub_queries(mut sub_queries: Vec<SubQuery>, max: usize) -> Vec<SubQuery> {
    if sub_queries.len() <= max.max(1) {
        return sub_queries;
    }
    let original = sub_queries.remove(0);
    sub_queries.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sub_queries.truncate(max.max(1) - 1);
    sub_queries.insert(0, original);
    sub_queries
}

// ============================================================================
// GAP-DRIVEN FOLLOW-UPS
// ============================================================================

/// Key terms of a query: tokens of 3+ characters outside the query stop set.
pub fn key_terms(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut seen = Vec::new();
    for token in cleaned.split_whitespace() {
        if token.len() >= 3
            && !QUERY_STOP_WORDS.contains(&token)
            && !seen.iter().any(|t| t == token)
        {
            seen.push(token.to_string());
        }
    }
    seen
}

/// Follow-up sub-queries for key terms the initial round did not cover.
///
/// A term is uncovered when it appears in no executed sub-query and in no
/// returned label or content (case-insensitive substring). The combined
/// round count stays within `max_sub_queries`.
pub fn plan_followups(
    original: &str,
    executed: &[SubQuery],
    results: &[RetrievedNode],
    config: &PlannerConfig,
) -> Vec<SubQuery> {
    let remaining = config.max_sub_queries.saturating_sub(executed.len());
    if remaining == 0 {
        return Vec::new();
    }

    let corpus: Vec<String> = results
        .iter()
        .map(|r| format!("{} {}", r.label, r.content).to_lowercase())
        .collect();
    let queried: Vec<String> = executed.iter().map(|q| q.text.to_lowercase()).collect();

    let mut followups = Vec::new();
    for term in key_terms(original) {
        if followups.len() >= remaining {
            break;
        }
        let already_queried = queried.iter().any(|q| q.contains(&term));
        let covered = corpus.iter().any(|text| text.contains(&term));
        if !already_queried && !covered {
            followups.push(SubQuery {
                text: term,
                weight: config.followup_weight,
            });
        }
    }
    followups
}

// ============================================================================
// FUSION
// ============================================================================

/// Fuse per-sub-query results by weighted score accumulation.
///
/// Each node's fused score is the sum of `weight * score` over every round
/// it appears in; its representative is the highest raw-scoring occurrence.
pub fn fuse(rounds: &[(SubQuery, Vec<RetrievedNode>)], top_k: usize) -> Vec<FusedResult> {
    let mut fused: HashMap<String, FusedResult> = HashMap::new();

    for (sub_query, results) in rounds {
        for result in results {
            match fused.get_mut(&result.id) {
                Some(entry) => {
                    entry.fused_score += sub_query.weight * result.score;
                    if result.score > entry.node.score {
                        entry.node = result.clone();
                    }
                }
                None => {
                    fused.insert(
                        result.id.clone(),
                        FusedResult {
                            node: result.clone(),
                            fused_score: sub_query.weight * result.score,
                        },
                    );
                }
            }
        }
    }

    let mut list: Vec<FusedResult> = fused.into_values().collect();
    list.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    list.truncate(top_k);
    list
}

// ============================================================================
// TESTS
// ============================================================================
