//! Semantic Chunking
//!
//! Long node content (>= 500 estimated tokens) is split into sentence-
//! aligned chunks before embedding or injection. Sentences group greedily up
//! to the token limit with a one-sentence overlap between adjacent chunks so
//! boundary context is never lost.

use crate::scoring::estimate_tokens;

/// Token ceiling per chunk
pub const CHUNK_TOKEN_LIMIT: usize = 500;

/// A sentence-aligned chunk of a longer text
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Index of the first sentence in the chunk
    pub start_sentence: usize,
    /// Index of the last sentence in the chunk (inclusive)
    pub end_sentence: usize,
    /// Chunk text
    pub text: String,
}

/// Split text into sentences.
///
/// A boundary is a period, exclamation, or question mark followed by
/// whitespace and a capital letter.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;

    let mut i = 0usize;
    while i < chars.len() {
        if matches!(chars[i], '.' | '!' | '?') {
            // Consume a run of terminators
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j], '.' | '!' | '?') {
                j += 1;
            }
            // Boundary requires whitespace then an uppercase letter
            let mut k = j;
            while k < chars.len() && chars[k].is_whitespace() {
                k += 1;
            }
            if k > j && k < chars.len() && chars[k].is_uppercase() {
                let sentence: String = chars[start..j].iter().collect();
                let trimmed = sentence.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                start = k;
                i = k;
                continue;
            }
            i = j;
            continue;
        }
        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    let trimmed = tail.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Chunk text into sentence groups of at most [`CHUNK_TOKEN_LIMIT`] tokens.
///
/// Content under the limit comes back as a single chunk. Adjacent chunks
/// overlap by one sentence.
pub fn chunk_text(text: &str) -> Vec<Chunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(trimmed);
    if estimate_tokens(trimmed) < CHUNK_TOKEN_LIMIT || sentences.len() <= 1 {
        return vec![Chunk {
            start_sentence: 0,
            end_sentence: sentences.len().saturating_sub(1),
            text: trimmed.to_string(),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < sentences.len() {
        let mut end = start;
        let mut tokens = estimate_tokens(&sentences[start]);

        while end + 1 < sentences.len() {
            let next_tokens = estimate_tokens(&sentences[end + 1]);
            if tokens + next_tokens > CHUNK_TOKEN_LIMIT {
                break;
            }
            tokens += next_tokens;
            end += 1;
        }

        chunks.push(Chunk {
            start_sentence: start,
            end_sentence: end,
            text: sentences[start..=end].join(" "),
        });

        if end + 1 >= sentences.len() {
            break;
        }
        // One-sentence overlap with the next chunk, while guaranteeing progress
        start = end.max(start + 1);
    }

    chunks
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("First sentence. Second one! Third? Done");
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "First sentence.");
        assert_eq!(sentences[1], "Second one!");
        assert_eq!(sentences[3], "Done");
    }

    #[test]
    fn test_split_requires_capital_after_terminator() {
        // "e.g. lowercase" is not a boundary
        let sentences = split_sentences("Use e.g. lowercase markers. Real boundary here.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("e.g. lowercase"));
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("A short note. Nothing to split.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_sentence, 0);
    }

    #[test]
    fn test_long_text_chunks_with_overlap() {
        // Each sentence ~50 words -> ~60+ tokens; 20 sentences exceed the limit
        let sentence = format!("{} end. ", "Word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word word");
        let text: String = (0..20).map(|_| format!("Begin {}", sentence)).collect();

        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(estimate_tokens(&chunk.text) <= CHUNK_TOKEN_LIMIT + CHUNK_TOKEN_LIMIT / 2);
        }
        // Overlap: each chunk starts on the previous chunk's last sentence
        for window in chunks.windows(2) {
            assert_eq!(window[1].start_sentence, window[0].end_sentence);
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   ").is_empty());
    }

    #[test]
    fn test_progress_on_giant_sentence() {
        let giant = "x".repeat(4000); // one unsplittable 1000-token sentence
        let text = format!("{} More. {} Done.", giant, giant);
        let chunks = chunk_text(&text);
        assert!(!chunks.is_empty());
        // Terminates and covers the final sentence
        assert_eq!(chunks.last().unwrap().end_sentence, split_sentences(&text).len() - 1);
    }
}
