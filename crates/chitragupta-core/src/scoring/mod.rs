//! Scoring Primitives
//!
//! Tokenization, cosine similarity, BM25-lite lexical scoring, and token
//! estimation. These free functions underpin every ranking path in the
//! substrate, so their behavior is part of the contract: the stop-word set
//! in particular affects recall and changes only with coordinated test
//! updates.

use std::collections::{HashMap, HashSet};

// ============================================================================
// TOKENIZATION
// ============================================================================

/// Fixed stop-word set shared by all lexical scoring paths.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by", "from", "is", "it", "this", "that", "was", "are", "be",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "not", "no",
];

/// Check whether a lowercase token is a stop word.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokenize text for lexical scoring.
///
/// Lowercases, strips non-alphanumeric characters to spaces, splits on
/// whitespace, and drops tokens shorter than 2 characters as well as stop
/// words.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.len() >= 2 && !is_stop_word(t))
        .map(|t| t.to_string())
        .collect()
}

/// Raw lowercase words of a text: split on non-alphanumeric, nothing
/// filtered.
pub fn raw_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Build a term-frequency map from tokens.
pub fn term_frequencies(tokens: &[String]) -> HashMap<String, usize> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token.clone()).or_insert(0) += 1;
    }
    tf
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Compute cosine similarity between two dense vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 { dot / denominator } else { 0.0 }
}

/// Cosine similarity between two bag-of-words term-frequency maps.
///
/// Used for topic-biased PageRank teleportation where no dense vectors are
/// available.
pub fn bow_cosine(a: &HashMap<String, usize>, b: &HashMap<String, usize>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    for (term, &fa) in a {
        if let Some(&fb) = b.get(term) {
            dot += (fa as f64) * (fb as f64);
        }
    }

    let norm_a: f64 = a.values().map(|&f| (f as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|&f| (f as f64).powi(2)).sum::<f64>().sqrt();

    let denominator = norm_a * norm_b;
    if denominator > 0.0 { dot / denominator } else { 0.0 }
}

// ============================================================================
// LEXICAL SCORING
// ============================================================================

/// BM25-lite lexical match score in [0, 1].
///
/// For each query token present in the document, adds `1 + ln(1 + tf)`,
/// multiplies by a coverage factor `0.5 + 0.5 * (matched / |query|)`, and
/// divides by the query length.
pub fn bm25_lite(query: &str, doc: &str) -> f64 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let doc_tokens = tokenize(doc);
    let tf = term_frequencies(&doc_tokens);

    let mut score = 0.0_f64;
    let mut matched = 0usize;
    for token in &query_tokens {
        if let Some(&freq) = tf.get(token) {
            score += 1.0 + (1.0 + freq as f64).ln();
            matched += 1;
        }
    }

    let coverage = 0.5 + 0.5 * (matched as f64 / query_tokens.len() as f64);
    (score * coverage / query_tokens.len() as f64).clamp(0.0, 1.0)
}

/// Check for a case-insensitive exact phrase match of the query in content.
pub fn exact_phrase_match(query: &str, content: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return false;
    }
    content.to_lowercase().contains(&q)
}

/// Jaccard overlap of the raw word sets of two texts, in [0, 1].
///
/// Raw lowercase words, with no stop-word or length filtering: duplicate
/// detection must see near-identical phrasings as overlapping even when
/// they differ only in filler words.
pub fn jaccard_overlap(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = raw_tokens(a).into_iter().collect();
    let set_b: HashSet<String> = raw_tokens(b).into_iter().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Estimate the model-token count of a text: `ceil(len / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize("The quick-brown Fox jumps!");
        assert_eq!(tokens, vec!["quick", "brown", "fox", "jumps"]);
    }

    #[test]
    fn test_tokenize_drops_short_and_stop_words() {
        let tokens = tokenize("I am in a house of cards");
        // "i" too short, "am" survives (not a stop word), "in"/"a"/"of" dropped
        assert!(tokens.contains(&"house".to_string()));
        assert!(tokens.contains(&"cards".to_string()));
        assert!(!tokens.contains(&"in".to_string()));
        assert!(!tokens.contains(&"of".to_string()));
        assert!(!tokens.contains(&"i".to_string()));
    }

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine(&a, &b).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_length_mismatch_and_zero_norm() {
        assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_bounds() {
        let a = vec![0.3, -0.9, 2.4, 0.1];
        let b = vec![-1.5, 0.2, 0.8, -3.0];
        let sim = cosine(&a, &b);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_bm25_lite_full_match_beats_partial() {
        let doc = "rust memory management with ownership";
        let full = bm25_lite("rust ownership", doc);
        let partial = bm25_lite("rust gardening", doc);
        assert!(full > partial);
        assert!(partial > 0.0);
    }

    #[test]
    fn test_bm25_lite_clamped() {
        let doc = "rust rust rust rust rust rust rust rust";
        let score = bm25_lite("rust", doc);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_bm25_lite_empty_query() {
        assert_eq!(bm25_lite("", "some document"), 0.0);
        assert_eq!(bm25_lite("the and of", "some document"), 0.0);
    }

    #[test]
    fn test_bow_cosine_overlap() {
        let a = term_frequencies(&tokenize("rust async runtime"));
        let b = term_frequencies(&tokenize("rust runtime internals"));
        let c = term_frequencies(&tokenize("gardening tips"));
        assert!(bow_cosine(&a, &b) > bow_cosine(&a, &c));
        assert_eq!(bow_cosine(&a, &c), 0.0);
    }

    #[test]
    fn test_exact_phrase_match() {
        assert!(exact_phrase_match("TypeScript generics", "I love typescript generics a lot"));
        assert!(!exact_phrase_match("generics TypeScript", "I love typescript generics"));
        assert!(!exact_phrase_match("", "anything"));
    }

    #[test]
    fn test_jaccard_overlap() {
        assert!(jaccard_overlap("I really like pizza and pasta", "I really like pizza and pasta too") > 0.8);
        assert!(jaccard_overlap("completely different words", "nothing shared here") < 0.1);
        assert_eq!(jaccard_overlap("", ""), 1.0);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(2000)), 500);
    }
}
