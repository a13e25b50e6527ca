//! Smaran Memory Store
//!
//! Typed user-memory facts with confidence decay, BM25 recall, and
//! dedup-by-overlap. Explicit memories start at full confidence and never
//! decay; inferred memories start at 0.6 with a 90-day half-life. Entries
//! persist as one markdown file each under a per-scope directory.

pub mod intent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::hash::fnv1a_32;
use crate::scoring::{bm25_lite, exact_phrase_match, jaccard_overlap, tokenize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Jaccard overlap above which an insert becomes an update
pub const DEDUP_THRESHOLD: f64 = 0.80;

/// Confidence boost applied when a duplicate reasserts an entry
pub const DEDUP_BOOST: f64 = 0.10;

/// Hard ceiling on `recall` result counts
pub const RECALL_LIMIT_CEILING: usize = 50;

/// Default half-life for inferred memories, in days
pub const INFERRED_HALF_LIFE_DAYS: f64 = 90.0;

/// Default confidence for inferred memories
pub const INFERRED_CONFIDENCE: f64 = 0.6;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Smaran error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SmaranError {
    /// Entry file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// An operation would breach a store invariant
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

// ============================================================================
// CATEGORY & SOURCE
// ============================================================================

/// Memory categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// A like, dislike, or standing preference
    Preference,
    /// A statement about the user or the world
    #[default]
    Fact,
    /// A recorded decision
    Decision,
    /// A standing instruction
    Instruction,
}

impl MemoryCategory {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Decision => "decision",
            MemoryCategory::Instruction => "instruction",
        }
    }

    /// Parse from string name, defaulting unknown names to `Fact`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "preference" => MemoryCategory::Preference,
            "decision" => MemoryCategory::Decision,
            "instruction" => MemoryCategory::Instruction,
            _ => MemoryCategory::Fact,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a memory entered the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    /// The user asked for it to be remembered
    #[default]
    Explicit,
    /// The system inferred it from conversation
    Inferred,
}

// ============================================================================
// ENTRY
// ============================================================================

/// A stored memory fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// `smr-` prefixed FNV-1a id
    pub id: String,
    /// Trimmed content
    pub content: String,
    /// Category
    pub category: MemoryCategory,
    /// Provenance
    pub source: MemorySource,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Tags, kept sorted and deduplicated
    #[serde(default)]
    pub tags: Vec<String>,
    /// Half-life in days; 0 disables decay
    pub decay_half_life_days: f64,
    /// Creation time; the decay reference point
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Time of the last materialized decay, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decayed_at: Option<DateTime<Utc>>,
    /// Owning session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Derive the `smr-` id from content, category, and creation time.
pub fn entry_id(content: &str, category: MemoryCategory, created_at: DateTime<Utc>) -> String {
    let key = format!(
        "{}|{}|{}",
        content,
        category.as_str(),
        created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    );
    format!("smr-{:08x}", fnv1a_32(key.as_bytes()))
}

impl MemoryEntry {
    /// Effective confidence at `now`, applying exponential decay from the
    /// decay anchor. Half-life 0 means no decay.
    pub fn effective_confidence(&self, now: DateTime<Utc>) -> f64 {
        if self.decay_half_life_days <= 0.0 {
            return self.confidence;
        }
        let anchor = self.decayed_at.unwrap_or(self.created_at);
        let elapsed_days = (now - anchor).num_milliseconds() as f64 / 86_400_000.0;
        if elapsed_days <= 0.0 {
            return self.confidence;
        }
        self.confidence * 0.5_f64.powf(elapsed_days / self.decay_half_life_days)
    }

    fn merge_tags(&mut self, tags: &[String]) {
        for tag in tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self.tags.sort_unstable();
    }
}

// ============================================================================
// OPTIONS & PATCH
// ============================================================================

/// Options for [`SmaranStore::remember`]
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Provenance; defaults to explicit
    pub source: MemorySource,
    /// Confidence override
    pub confidence: Option<f64>,
    /// Initial tags
    pub tags: Vec<String>,
    /// Half-life override, in days
    pub half_life_days: Option<f64>,
    /// Owning session
    pub session_id: Option<String>,
}

/// Partial update for [`SmaranStore::update`]
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// Replacement content
    pub content: Option<String>,
    /// Replacement category
    pub category: Option<MemoryCategory>,
    /// Replacement confidence, clamped to [0, 1]
    pub confidence: Option<f64>,
    /// Tags to merge in
    pub tags: Option<Vec<String>>,
    /// Replacement half-life
    pub half_life_days: Option<f64>,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Store limits
#[derive(Debug, Clone)]
pub struct SmaranConfig {
    /// Entry ceiling; overflow evicts the lowest effective confidence
    pub max_entries: usize,
    /// Default recall result count
    pub default_recall_limit: usize,
}

impl Default for SmaranConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_recall_limit: 10,
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// The smaran memory store
#[derive(Debug, Default)]
pub struct SmaranStore {
    entries: Vec<MemoryEntry>,
    config: SmaranConfig,
}

impl SmaranStore {
    /// Create an empty store with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom limits
    pub fn with_config(config: SmaranConfig) -> Self {
        Self {
            entries: Vec::new(),
            config,
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by id
    pub fn get(&self, id: &str) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Store a memory. When the content overlaps an existing entry above the
    /// dedup threshold, that entry is updated instead: confidence rises by
    /// 0.10 (clamped), tags merge, and `updated_at` refreshes. The decay
    /// anchor is untouched, so repetition raises confidence without
    /// restarting the decay schedule.
    pub fn remember(
        &mut self,
        content: &str,
        category: MemoryCategory,
        opts: RememberOptions,
    ) -> MemoryEntry {
        let content = content.trim().to_string();
        let now = Utc::now();

        let duplicate = self
            .entries
            .iter()
            .position(|e| jaccard_overlap(&e.content, &content) > DEDUP_THRESHOLD);
        if let Some(index) = duplicate {
            let entry = &mut self.entries[index];
            entry.confidence = (entry.confidence + DEDUP_BOOST).min(1.0);
            entry.merge_tags(&opts.tags);
            entry.updated_at = now;
            return entry.clone();
        }

        let (default_confidence, default_half_life) = match opts.source {
            MemorySource::Explicit => (1.0, 0.0),
            MemorySource::Inferred => (INFERRED_CONFIDENCE, INFERRED_HALF_LIFE_DAYS),
        };

        let mut entry = MemoryEntry {
            id: entry_id(&content, category, now),
            content,
            category,
            source: opts.source,
            confidence: opts.confidence.unwrap_or(default_confidence).clamp(0.0, 1.0),
            tags: Vec::new(),
            decay_half_life_days: opts.half_life_days.unwrap_or(default_half_life).max(0.0),
            created_at: now,
            updated_at: now,
            decayed_at: None,
            session_id: opts.session_id,
        };
        entry.merge_tags(&opts.tags);

        if self.entries.len() >= self.config.max_entries {
            self.evict_weakest(now);
        }
        self.entries.push(entry.clone());
        entry
    }

    /// Drop the entry with the lowest effective confidence (oldest wins ties).
    fn evict_weakest(&mut self, now: DateTime<Utc>) {
        let weakest = self
            .entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.effective_confidence(now)
                    .partial_cmp(&b.effective_confidence(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .map(|(i, _)| i);
        if let Some(index) = weakest {
            let evicted = self.entries.remove(index);
            tracing::warn!("smaran at capacity, evicted {}", evicted.id);
        }
    }

    /// Remove an entry by id
    pub fn forget(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() < before
    }

    /// Remove all entries whose content contains the substring,
    /// case-insensitively. Returns the number removed.
    pub fn forget_by_content(&mut self, substring: &str) -> usize {
        let needle = substring.trim().to_lowercase();
        if needle.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries
            .retain(|e| !e.content.to_lowercase().contains(&needle));
        before - self.entries.len()
    }

    /// Ranked recall. Empty or stop-word-only queries return nothing; the
    /// result count is capped at 50 regardless of the requested limit.
    pub fn recall(&self, query: &str, limit: Option<usize>) -> Vec<(MemoryEntry, f64)> {
        if tokenize(query).is_empty() {
            return Vec::new();
        }
        let now = Utc::now();
        let limit = limit
            .unwrap_or(self.config.default_recall_limit)
            .min(RECALL_LIMIT_CEILING);

        let mut scored: Vec<(MemoryEntry, f64)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let lexical = bm25_lite(query, &entry.content);
                if lexical <= 0.0 {
                    return None;
                }
                let phrase = if exact_phrase_match(query, &entry.content) {
                    1.0
                } else {
                    0.0
                };
                let confidence = entry.effective_confidence(now);
                let score = lexical * (1.0 + 0.5 * phrase) * (0.5 + 0.5 * confidence);
                Some((entry.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(limit);
        scored
    }

    /// Entries of a category, sorted by confidence descending
    pub fn list_by_category(&self, category: MemoryCategory) -> Vec<&MemoryEntry> {
        let mut list: Vec<&MemoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.category == category)
            .collect();
        list.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        list
    }

    /// All entries, most recently updated first
    pub fn list_all(&self) -> Vec<&MemoryEntry> {
        let mut list: Vec<&MemoryEntry> = self.entries.iter().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    /// Apply a partial update. Returns the updated entry, or `None` when the
    /// id is unknown.
    pub fn update(&mut self, id: &str, patch: MemoryPatch) -> Option<MemoryEntry> {
        let entry = self.entries.iter_mut().find(|e| e.id == id)?;
        if let Some(content) = patch.content {
            entry.content = content.trim().to_string();
        }
        if let Some(category) = patch.category {
            entry.category = category;
        }
        if let Some(confidence) = patch.confidence {
            entry.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(tags) = patch.tags {
            entry.merge_tags(&tags);
        }
        if let Some(half_life) = patch.half_life_days {
            entry.decay_half_life_days = half_life.max(0.0);
        }
        entry.updated_at = Utc::now();
        Some(entry.clone())
    }

    /// Materialize decay into stored confidence and advance the decay
    /// anchor. Entries with half-life 0 are untouched.
    pub fn decay_confidence(&mut self) {
        let now = Utc::now();
        for entry in &mut self.entries {
            if entry.decay_half_life_days <= 0.0 {
                continue;
            }
            entry.confidence = entry.effective_confidence(now);
            entry.decayed_at = Some(now);
        }
    }

    /// Remove entries whose effective confidence has fallen below the
    /// threshold. Returns the number pruned.
    pub fn prune(&mut self, threshold: f64) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries
            .retain(|e| e.effective_confidence(now) >= threshold);
        before - self.entries.len()
    }

    /// Render a markdown context section. With a query, top recall results;
    /// without, the strongest entries per category.
    pub fn build_context_section(&self, query: Option<&str>) -> String {
        let mut lines = vec!["## Memories".to_string()];

        let picks: Vec<MemoryEntry> = match query {
            Some(q) => self.recall(q, Some(8)).into_iter().map(|(e, _)| e).collect(),
            None => {
                let mut picks = Vec::new();
                for category in [
                    MemoryCategory::Preference,
                    MemoryCategory::Fact,
                    MemoryCategory::Decision,
                    MemoryCategory::Instruction,
                ] {
                    for entry in self.list_by_category(category).into_iter().take(3) {
                        picks.push(entry.clone());
                    }
                }
                picks
            }
        };

        if picks.is_empty() {
            return String::new();
        }
        let now = Utc::now();
        for entry in picks {
            lines.push(format!(
                "- [{}] {} (confidence {:.2})",
                entry.category,
                entry.content,
                entry.effective_confidence(now)
            ));
        }
        lines.join("\n")
    }

    // ------------------------------------------------------------------
    // Persistence: one markdown file per entry
    // ------------------------------------------------------------------

    /// Write every entry to `dir`, one markdown file per entry named by id.
    pub fn save_to_dir(&self, dir: &Path) -> Result<usize, SmaranError> {
        std::fs::create_dir_all(dir)?;
        for entry in &self.entries {
            let path = dir.join(format!("{}.md", entry.id));
            std::fs::write(path, render_entry(entry))?;
        }
        Ok(self.entries.len())
    }

    /// Load every `*.md` entry file from `dir`. Malformed files are logged
    /// and skipped.
    pub fn load_from_dir(&mut self, dir: &Path) -> Result<usize, SmaranError> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0usize;
        for item in std::fs::read_dir(dir)? {
            let item = item?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match parse_entry(&raw) {
                Some(entry) => {
                    if !self.entries.iter().any(|e| e.id == entry.id) {
                        self.entries.push(entry);
                        loaded += 1;
                    }
                }
                None => tracing::warn!("skipping malformed memory file {:?}", path),
            }
        }
        Ok(loaded)
    }
}

// ============================================================================
// ENTRY CODEC
// ============================================================================

fn render_entry(entry: &MemoryEntry) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("id: {}\n", entry.id));
    out.push_str(&format!("category: {}\n", entry.category));
    out.push_str(&format!(
        "source: {}\n",
        match entry.source {
            MemorySource::Explicit => "explicit",
            MemorySource::Inferred => "inferred",
        }
    ));
    out.push_str(&format!("confidence: {}\n", entry.confidence));
    if !entry.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", entry.tags.join(", ")));
    }
    out.push_str(&format!("decayHalfLifeDays: {}\n", entry.decay_half_life_days));
    out.push_str(&format!(
        "created: {}\n",
        entry.created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    ));
    out.push_str(&format!(
        "updated: {}\n",
        entry.updated_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    ));
    if let Some(decayed) = entry.decayed_at {
        out.push_str(&format!(
            "decayed: {}\n",
            decayed.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        ));
    }
    if let Some(session) = &entry.session_id {
        out.push_str(&format!("session: {}\n", session));
    }
    out.push_str("---\n\n");
    out.push_str(&entry.content);
    out.push('\n');
    out
}

fn parse_entry(raw: &str) -> Option<MemoryEntry> {
    let rest = raw.strip_prefix("---\n")?;
    let (frontmatter, body) = rest.split_once("\n---\n")?;

    let mut entry = MemoryEntry {
        id: String::new(),
        content: body.trim().to_string(),
        category: MemoryCategory::Fact,
        source: MemorySource::Explicit,
        confidence: 1.0,
        tags: Vec::new(),
        decay_half_life_days: 0.0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        decayed_at: None,
        session_id: None,
    };

    for line in frontmatter.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "id" => entry.id = value.to_string(),
            "category" => entry.category = MemoryCategory::parse_name(value),
            "source" => {
                entry.source = if value == "inferred" {
                    MemorySource::Inferred
                } else {
                    MemorySource::Explicit
                }
            }
            "confidence" => entry.confidence = value.parse().unwrap_or(1.0),
            "tags" => {
                entry.tags = value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }
            "decayHalfLifeDays" => entry.decay_half_life_days = value.parse().unwrap_or(0.0),
            "created" => {
                entry.created_at = DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc)
            }
            "updated" => {
                entry.updated_at = DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc)
            }
            "decayed" => {
                entry.decayed_at = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }
            "session" => entry.session_id = Some(value.to_string()),
            _ => {}
        }
    }

    if entry.id.is_empty() || entry.content.is_empty() {
        return None;
    }
    Some(entry)
}

// ============================================================================
// CATEGORY AUTO-DETECTION
// ============================================================================

static PREFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i\s+(?:really\s+)?(?:like|love|hate|dislike|prefer)|prefer|always|usually)\b")
        .expect("preference pattern")
});

static DECISION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:decided|choosing|let'?s\s+use|going\s+with|we\s+chose)\b")
        .expect("decision pattern")
});

static INSTRUCTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from\s+now\s+on|whenever|every\s+time|make\s+sure|remember\s+to)\b")
        .expect("instruction pattern")
});

static FACT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i\s+am|i'm|my\s+name\s+is|i\s+live\s+in|i\s+work)\b")
        .expect("fact pattern")
});

/// Detect the most likely category for a piece of text.
///
/// Patterns are checked in order: preference, decision, instruction, fact.
/// "always do X" classifies as a preference because the preference pattern
/// is tested first.
pub fn detect_category(text: &str) -> MemoryCategory {
    if PREFERENCE_PATTERN.is_match(text) {
        MemoryCategory::Preference
    } else if DECISION_PATTERN.is_match(text) {
        MemoryCategory::Decision
    } else if INSTRUCTION_PATTERN.is_match(text) {
        MemoryCategory::Instruction
    } else if FACT_PATTERN.is_match(text) {
        MemoryCategory::Fact
    } else {
        MemoryCategory::Fact
    }
}

// ============================================================================
// TESTS
// ============================================================================
