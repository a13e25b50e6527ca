//! Provider Endpoints
//!
//! HTTP client for the local embedding/generation provider (Ollama wire
//! format). The substrate treats both models as black-box functions; every
//! call carries a timeout and failures surface as typed errors so callers
//! can degrade to offline fallbacks.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default provider endpoint when `OLLAMA_HOST` is not set.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";

/// Liveness probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Generation call timeout.
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Provider error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Endpoint unreachable or timed out
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    /// Non-OK HTTP status
    #[error("Provider returned HTTP {0}")]
    Status(u16),
    /// Malformed response body
    #[error("Provider response parse error: {0}")]
    Parse(String),
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Provider endpoint configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base endpoint URL
    pub endpoint: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Liveness probe timeout
    pub probe_timeout: Duration,
    /// Generation timeout
    pub generate_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let endpoint =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self {
            endpoint,
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "llama3.2".to_string(),
            probe_timeout: PROBE_TIMEOUT,
            generate_timeout: GENERATE_TIMEOUT,
        }
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// HTTP client for the provider endpoints
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    /// Create a new client for the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// The configured endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Probe `GET {endpoint}/api/version` for liveness.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/api/version", self.config.endpoint);
        match self
            .http
            .get(&url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("provider probe failed: {}", e);
                false
            }
        }
    }

    /// `POST {endpoint}/api/embeddings` for a single prompt.
    pub async fn embeddings(&self, prompt: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.config.endpoint);
        let body = EmbeddingsRequest {
            model: &self.config.embed_model,
            prompt,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.config.generate_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }

        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parsed.embedding)
    }

    /// `POST {endpoint}/api/generate` with `stream: false`.
    pub async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.config.endpoint);
        let body = GenerateRequest {
            model: &self.config.generate_model,
            prompt,
            stream: false,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.config.generate_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parsed.response)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_endpoint() {
        let config = ProviderConfig::default();
        assert!(config.endpoint.starts_with("http"));
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.generate_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_wire_types_serialize() {
        let req = EmbeddingsRequest {
            model: "nomic-embed-text",
            prompt: "hello",
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"model\""));
        assert!(json.contains("\"prompt\""));

        let resp: EmbeddingsResponse =
            serde_json::from_str(r#"{"embedding": [0.1, 0.2]}"#).unwrap();
        assert_eq!(resp.embedding.len(), 2);

        let r#gen: GenerateResponse =
            serde_json::from_str(r#"{"response": "ok", "done": true}"#).unwrap();
        assert_eq!(r#gen.response, "ok");
    }
}
