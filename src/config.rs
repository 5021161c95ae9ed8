use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the retrieval core. Every field has a documented
/// default; external layering (flags > env > file) happens outside the
/// engine; callers hand us the final struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target chunk size in bytes.
    pub chunk_size: usize,
    /// Overlap between successive chunks, in bytes.
    pub chunk_overlap: usize,
    /// RRF rank constant: score contribution is 1/(k + rank).
    pub rrf_k: u32,
    /// Post-fusion multiplier for chunks that syntactically define a symbol.
    pub definition_boost: f32,
    /// Cosine threshold for the semantic (L2) query-cache level.
    pub semantic_cache_threshold: f32,
    /// Query-cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Each search arm fetches min(overfetch_factor * limit, 100) rows.
    pub overfetch_factor: usize,
    /// Smart-context expansion never returns more than this many lines.
    pub context_line_cap: usize,
    /// Result lines longer than this are truncated with an ellipsis.
    pub context_col_cap: usize,
    /// An index older than this many days counts as stale in stats.
    pub staleness_days: i64,
    /// Files larger than this are skipped during enumeration.
    pub max_file_bytes: u64,
    /// Number of chunks sent to the embedder per request.
    pub embed_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 300,
            rrf_k: 60,
            definition_boost: 2.0,
            semantic_cache_threshold: 0.95,
            cache_ttl_secs: 24 * 60 * 60,
            overfetch_factor: 2,
            context_line_cap: 50,
            context_col_cap: 200,
            staleness_days: 7,
            // 512 KB is enough for any real source file and blocks log/generated bloat.
            max_file_bytes: 512 * 1024,
            embed_batch_size: 32,
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Over-fetch limit for one search arm given the caller's limit.
    pub fn arm_limit(&self, limit: usize) -> usize {
        (self.overfetch_factor * limit).min(100).max(limit)
    }
}

/// Connection settings for the Postgres store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Postgres connection URL (pgvector extension required).
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/cocosearch".to_string(),
            max_connections: 8,
            connect_timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    /// Read the connection URL from `COCOSEARCH_DATABASE_URL` (falling back
    /// to `DATABASE_URL`) when present. The only environment touchpoint in
    /// the engine; everything else arrives through the structs.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("COCOSEARCH_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            if !url.is_empty() {
                cfg.url = url;
            }
        }
        cfg
    }
}

/// Settings for the external embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Base URL of an OpenAI-compatible `/v1/embeddings` endpoint.
    pub url: String,
    pub model: String,
    /// Declared vector dimension; every response is validated against it.
    pub dimension: usize,
    pub timeout_secs: u64,
    /// Retry attempts before the call surfaces `EmbedderUnavailable`.
    pub max_retries: u32,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/v1/embeddings".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl EmbedderConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("COCOSEARCH_EMBEDDER_URL") {
            if !url.is_empty() {
                cfg.url = url;
            }
        }
        if let Ok(model) = std::env::var("COCOSEARCH_EMBEDDER_MODEL") {
            if !model.is_empty() {
                cfg.model = model;
            }
        }
        if let Ok(dim) = std::env::var("COCOSEARCH_EMBEDDER_DIM") {
            if let Ok(d) = dim.parse::<usize>() {
                cfg.dimension = d;
            }
        }
        cfg
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_limit_overfetches_and_caps() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.arm_limit(10), 20);
        assert_eq!(cfg.arm_limit(80), 100);
        // Never below the caller's own limit, even with a tiny factor.
        let cfg = EngineConfig {
            overfetch_factor: 0,
            ..Default::default()
        };
        assert_eq!(cfg.arm_limit(10), 10);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.chunk_size, 1000);
        assert_eq!(cfg.chunk_overlap, 300);
        assert_eq!(cfg.rrf_k, 60);
        assert_eq!(cfg.definition_boost, 2.0);
        assert_eq!(cfg.semantic_cache_threshold, 0.95);
        assert_eq!(cfg.cache_ttl_secs, 86_400);
    }
}
