//! Embedding Service
//!
//! Text to fixed-dimension vectors. A configured provider endpoint is probed
//! once and remembered; when it is unreachable the service degrades to a
//! deterministic hash-based pseudo-embedding so the rest of the pipeline
//! stays usable offline. All lookups go through an LRU cache that can be
//! flushed to and reloaded from `embeddings.json`.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use crate::hash::{fnv1a_64, splitmix64};
use crate::providers::{ProviderClient, ProviderConfig};
use crate::scoring::tokenize;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default embedding dimensionality
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// Default LRU cache capacity
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding persistence error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Cache file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Cache file was malformed
    #[error("Cache parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Embedding service configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Vector dimensionality
    pub dimensions: usize,
    /// LRU cache capacity
    pub cache_capacity: usize,
    /// Provider endpoint; `None` runs fully offline on the hash fallback
    pub provider: Option<ProviderConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: EMBEDDING_DIMENSIONS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            provider: Some(ProviderConfig::default()),
        }
    }
}

impl EmbeddingConfig {
    /// Configuration with no provider endpoint (tests, offline use)
    pub fn offline() -> Self {
        Self {
            provider: None,
            ..Default::default()
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Service for generating and caching embeddings
pub struct EmbeddingService {
    config: EmbeddingConfig,
    client: Option<ProviderClient>,
    /// Read-through / write-through cache keyed by exact text
    cache: Mutex<LruCache<String, Vec<f32>>>,
    /// Memoized provider availability; `None` until the first probe
    availability: Mutex<Option<bool>>,
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default())
    }
}

impl EmbeddingService {
    /// Create a new embedding service
    pub fn new(config: EmbeddingConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let client = config.provider.clone().map(ProviderClient::new);
        Self {
            config,
            client,
            cache: Mutex::new(LruCache::new(capacity)),
            availability: Mutex::new(None),
        }
    }

    /// Vector dimensionality
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Number of cached embeddings
    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Configured cache capacity
    pub fn cache_capacity(&self) -> usize {
        self.config.cache_capacity
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_availability(&self) -> std::sync::MutexGuard<'_, Option<bool>> {
        match self.availability.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether the provider endpoint is reachable. The first call probes the
    /// endpoint; the result is memoized until [`reset_availability`].
    ///
    /// [`reset_availability`]: Self::reset_availability
    pub async fn is_available(&self) -> bool {
        if let Some(known) = *self.lock_availability() {
            return known;
        }
        let available = match &self.client {
            Some(client) => client.probe().await,
            None => false,
        };
        if !available && self.client.is_some() {
            tracing::warn!("embedding provider unreachable, using hash fallback");
        }
        *self.lock_availability() = Some(available);
        available
    }

    /// Forget the memoized availability so the next call probes again.
    pub fn reset_availability(&self) {
        *self.lock_availability() = None;
    }

    /// Look up a cached embedding without generating one.
    pub fn cached(&self, text: &str) -> Option<Vec<f32>> {
        self.lock_cache().get(text).cloned()
    }

    /// Embed a text, preferring the provider and degrading to the hash
    /// fallback. Never fails: provider errors are absorbed locally.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(hit) = self.cached(text) {
            return hit;
        }

        let vector = match &self.client {
            Some(client) if self.is_available().await => match client.embeddings(text).await {
                Ok(v) if !v.is_empty() => v,
                Ok(_) => hash_embedding(text, self.config.dimensions),
                Err(e) => {
                    tracing::warn!("embedding call failed, falling back: {}", e);
                    hash_embedding(text, self.config.dimensions)
                }
            },
            _ => hash_embedding(text, self.config.dimensions),
        };

        self.lock_cache().put(text.to_string(), vector.clone());
        vector
    }

    /// Insert a precomputed embedding (cache load path).
    pub fn insert(&self, text: String, vector: Vec<f32>) {
        self.lock_cache().put(text, vector);
    }

    /// Flush the cache to a JSON file (`{text: [float, ...]}`).
    pub fn flush(&self, path: &Path) -> Result<(), EmbeddingError> {
        let map: HashMap<String, Vec<f32>> = self
            .lock_cache()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&map)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a JSON cache file, trimming to the configured LRU capacity.
    /// Malformed files are logged and treated as empty.
    pub fn load(&self, path: &Path) -> Result<usize, EmbeddingError> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<String, Vec<f32>> = match serde_json::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("embedding cache at {:?} is malformed: {}", path, e);
                return Ok(0);
            }
        };

        let mut cache = self.lock_cache();
        let mut loaded = 0usize;
        for (text, vector) in map {
            if loaded >= self.config.cache_capacity {
                break;
            }
            cache.put(text, vector);
            loaded += 1;
        }
        Ok(loaded)
    }
}

// ============================================================================
// HASH FALLBACK
// ============================================================================

/// Deterministic hash-based pseudo-embedding.
///
/// Each token seeds a splitmix64 sequence that scatters signed mass into a
/// handful of dimensions; the result is L2-normalized. Stable across runs
/// and platforms: the same text always maps to the same vector.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0_f32; dimensions.max(1)];
    let tokens = tokenize(text);

    let terms: Vec<String> = if tokens.is_empty() {
        vec![text.trim().to_lowercase()]
    } else {
        tokens
    };

    for term in &terms {
        let mut state = fnv1a_64(term.as_bytes());
        for k in 0..4 {
            let value = splitmix64(&mut state);
            let index = (value % vector.len() as u64) as usize;
            let sign = if value & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign / (1.0 + k as f32);
        }
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::cosine;

    #[test]
    fn test_hash_embedding_deterministic() {
        let a = hash_embedding("the same text", 128);
        let b = hash_embedding("the same text", 128);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedding_normalized() {
        let v = hash_embedding("some content to embed", 768);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hash_embedding_similar_texts_closer() {
        let a = hash_embedding("rust memory management ownership", 768);
        let b = hash_embedding("rust memory ownership model", 768);
        let c = hash_embedding("tropical fruit salad recipe", 768);
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[tokio::test]
    async fn test_offline_service_uses_fallback() {
        let service = EmbeddingService::new(EmbeddingConfig::offline());
        assert!(!service.is_available().await);

        let v = service.embed("offline embedding").await;
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
        assert_eq!(service.cached("offline embedding"), Some(v));
    }

    #[tokio::test]
    async fn test_cache_capacity_bounded() {
        let service = EmbeddingService::new(EmbeddingConfig {
            cache_capacity: 3,
            ..EmbeddingConfig::offline()
        });
        for i in 0..10 {
            service.embed(&format!("text number {}", i)).await;
        }
        assert!(service.cache_len() <= 3);
    }

    #[tokio::test]
    async fn test_flush_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        let service = EmbeddingService::new(EmbeddingConfig::offline());
        let original = service.embed("persisted text").await;
        service.flush(&path).unwrap();

        let restored = EmbeddingService::new(EmbeddingConfig::offline());
        let loaded = restored.load(&path).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(restored.cached("persisted text"), Some(original));
    }

    #[test]
    fn test_load_malformed_cache_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "not json at all").unwrap();

        let service = EmbeddingService::new(EmbeddingConfig::offline());
        assert_eq!(service.load(&path).unwrap(), 0);
    }

    #[test]
    fn test_reset_availability() {
        let service = EmbeddingService::new(EmbeddingConfig::offline());
        *service.lock_availability() = Some(false);
        service.reset_availability();
        assert!(service.lock_availability().is_none());
    }
}
