//! Adapter over the external embedding service.
//!
//! One `Embedder` value is shared by the indexing and search pipelines so
//! both sides are guaranteed to use the same model and dimension; the store
//! re-validates the dimension at insert time as a second line of defense.
//!
//! The HTTP implementation speaks the OpenAI-compatible `/v1/embeddings`
//! shape, which local runners (Ollama, llama.cpp, vLLM) also serve.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbedderConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Declared vector dimension D. Every index created with this embedder
    /// stores vectors of exactly this length.
    fn dimension(&self) -> usize;

    /// Embed a batch of UTF-8 texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut out = self.embed_batch(&input).await?;
        out.pop().ok_or_else(|| Error::EmbedderUnavailable {
            attempts: 1,
            message: "embedding service returned an empty batch".to_string(),
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: reqwest::Client,
    cfg: EmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(cfg: EmbedderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| Error::EmbedderUnavailable {
                attempts: 0,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, cfg })
    }

    async fn request_once(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
        let body = EmbeddingRequest {
            model: &self.cfg.model,
            input: texts,
        };
        let resp = self
            .client
            .post(&self.cfg.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| e.to_string())?;
        if parsed.data.len() != texts.len() {
            return Err(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            ));
        }
        Ok(parsed.data.into_iter().map(|r| r.embedding).collect())
    }
}

/// Backoff before retry `attempt` (1-based): 500 ms doubling, capped at 8 s.
fn backoff_delay(attempt: u32) -> Duration {
    let millis = 500u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(4));
    Duration::from_millis(millis.min(8_000))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let attempts = self.cfg.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            match self.request_once(texts).await {
                Ok(vectors) => {
                    for v in &vectors {
                        if v.len() != self.cfg.dimension {
                            return Err(Error::DimensionMismatch {
                                expected: self.cfg.dimension,
                                got: v.len(),
                            });
                        }
                    }
                    return Ok(vectors);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "embedding request failed");
                    last_error = e;
                }
            }
        }

        Err(Error::EmbedderUnavailable {
            attempts,
            message: last_error,
        })
    }
}
