//! Memory NLU
//!
//! Classifies a user utterance into a memory action with extracted content
//! or query. Pattern priority is fixed: forget, then list, then recall, then
//! remember; the first match wins. The bare list form ("what do you
//! remember") fires before recall, so "what do you remember about food"
//! classifies as a list as well.

use std::sync::LazyLock;

use regex::Regex;

use super::{detect_category, MemoryCategory};

// ============================================================================
// INTENT TYPES
// ============================================================================

/// Memory action detected in an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAction {
    /// Store new content
    Remember,
    /// Remove matching memories
    Forget,
    /// Search memories
    Recall,
    /// Enumerate memories
    List,
}

/// A detected memory intent
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryIntent {
    /// The action to take
    pub action: MemoryAction,
    /// Content to store, for remember intents
    pub content: Option<String>,
    /// Search or deletion query, where applicable
    pub query: Option<String>,
    /// Auto-detected category, for remember intents
    pub category: Option<MemoryCategory>,
}

// ============================================================================
// PATTERN TABLES
// ============================================================================

static FORGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?(?:forget|stop\s+remembering|delete\s+(?:the\s+)?memor(?:y|ies))\s+(?:about\s+|that\s+)?(.+?)[.!?]?$",
    )
    .expect("forget pattern")
});

static LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:what\s+do\s+you\s+(?:remember|know)|(?:list|show)(?:\s+me)?(?:\s+all)?(?:\s+my|\s+your)?\s+memories)\b",
    )
    .expect("list pattern")
});

static RECALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:what\s+did\s+i\s+say\s+about|do\s+you\s+recall|recall|remind\s+me\s+(?:about|of)|search\s+(?:your\s+)?memor(?:y|ies)\s+for)\s+(.+?)[.!?]?$",
    )
    .expect("recall pattern")
});

static REMEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:please\s+)?remember\s+(?:that\s+)?(.+?)[.!?]?$").expect("remember pattern")
});

// ============================================================================
// DETECTION
// ============================================================================

/// Detect a memory intent in an utterance, if any.
pub fn detect_memory_intent(utterance: &str) -> Option<MemoryIntent> {
    let utterance = utterance.trim();
    if utterance.is_empty() {
        return None;
    }

    if let Some(caps) = FORGET.captures(utterance) {
        let target = caps.get(1).map(|m| m.as_str().trim().to_string());
        return Some(MemoryIntent {
            action: MemoryAction::Forget,
            content: None,
            query: target,
            category: None,
        });
    }

    if LIST.is_match(utterance) {
        return Some(MemoryIntent {
            action: MemoryAction::List,
            content: None,
            query: None,
            category: None,
        });
    }

    if let Some(caps) = RECALL.captures(utterance) {
        let query = caps.get(1).map(|m| m.as_str().trim().to_string());
        return Some(MemoryIntent {
            action: MemoryAction::Recall,
            content: None,
            query,
            category: None,
        });
    }

    if let Some(caps) = REMEMBER.captures(utterance) {
        let content = caps.get(1).map(|m| m.as_str().trim().to_string())?;
        let category = detect_category(&content);
        return Some(MemoryIntent {
            action: MemoryAction::Remember,
            content: Some(content),
            query: None,
            category: Some(category),
        });
    }

    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_intent() {
        let intent = detect_memory_intent("remember that I like spicy food").unwrap();
        assert_eq!(intent.action, MemoryAction::Remember);
        assert_eq!(intent.content.as_deref(), Some("I like spicy food"));
        assert_eq!(intent.category, Some(MemoryCategory::Preference));
    }

    #[test]
    fn test_remember_without_that() {
        let intent = detect_memory_intent("Remember my name is Ada.").unwrap();
        assert_eq!(intent.action, MemoryAction::Remember);
        assert_eq!(intent.content.as_deref(), Some("my name is Ada"));
        assert_eq!(intent.category, Some(MemoryCategory::Fact));
    }

    #[test]
    fn test_forget_intent() {
        let intent = detect_memory_intent("forget about my old email address").unwrap();
        assert_eq!(intent.action, MemoryAction::Forget);
        assert_eq!(intent.query.as_deref(), Some("my old email address"));
    }

    #[test]
    fn test_forget_beats_remember_priority() {
        // "stop remembering" must not classify as a remember
        let intent = detect_memory_intent("stop remembering my birthday").unwrap();
        assert_eq!(intent.action, MemoryAction::Forget);
    }

    #[test]
    fn test_bare_list_intent() {
        let intent = detect_memory_intent("what do you remember").unwrap();
        assert_eq!(intent.action, MemoryAction::List);
        assert!(intent.query.is_none());
    }

    #[test]
    fn test_list_preempts_recall_with_about_clause() {
        // Documented precedence: the bare-form list pattern fires first
        let intent = detect_memory_intent("what do you remember about food").unwrap();
        assert_eq!(intent.action, MemoryAction::List);
        assert!(intent.query.is_none());
    }

    #[test]
    fn test_show_memories_is_list() {
        let intent = detect_memory_intent("show me all my memories").unwrap();
        assert_eq!(intent.action, MemoryAction::List);
    }

    #[test]
    fn test_recall_intent() {
        let intent = detect_memory_intent("what did I say about the deploy schedule?").unwrap();
        assert_eq!(intent.action, MemoryAction::Recall);
        assert_eq!(intent.query.as_deref(), Some("the deploy schedule"));
    }

    #[test]
    fn test_remind_me_is_recall() {
        let intent = detect_memory_intent("remind me about kafka retention").unwrap();
        assert_eq!(intent.action, MemoryAction::Recall);
        assert_eq!(intent.query.as_deref(), Some("kafka retention"));
    }

    #[test]
    fn test_non_memory_utterance() {
        assert!(detect_memory_intent("how is the weather today").is_none());
        assert!(detect_memory_intent("").is_none());
        assert!(detect_memory_intent("refactor the parser module").is_none());
    }
}
