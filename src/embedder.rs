//! Embedding providers.
//!
//! Two variants behind one [`Embedder`] trait: an HTTP provider-hosted
//! endpoint (`openai`-compatible) and an in-process local transformer model
//! (`fastembed`). Both batch; provider calls dominate indexing cost, so
//! batching is part of the contract, not an optimization bolted on later.
//! Failures are retried with exponential backoff up to 3 attempts
//! (1s/2s/4s).

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use crate::config::Config;

const MAX_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts into a batch of fixed-dimension vectors, in
    /// the same order as the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string (same contract as `embed_batch` with one
    /// input, kept distinct for providers that treat queries specially).
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        out.pop().context("embedder returned no vectors for a single-item batch")
    }

    fn dims(&self) -> usize;
}

/// Build the configured embedder.
pub fn create_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    match config.embedder_provider.as_str() {
        "openai" => Ok(Box::new(HttpEmbedder::new(config.embedder_model.clone()))),
        "local" => Ok(Box::new(LocalEmbedder::new(&config.embedder_model)?)),
        other => anyhow::bail!("unknown embedder_provider: {other}"),
    }
}

// ───────────────────────────── HTTP provider ─────────────────────────────

/// Provider-hosted embedding endpoint, OpenAI-compatible. Requires
/// `OPENAI_API_KEY` in the environment, mirroring teacher's
/// `OpenAIProvider`.
pub struct HttpEmbedder {
    model: String,
    client: reqwest::Client,
    dims: usize,
}

impl HttpEmbedder {
    pub fn new(model: String) -> Self {
        Self {
            model,
            client: reqwest::Client::new(),
            dims: 1536,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set when embedder_provider = 'openai'")?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_embed(&api_key, texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let backoff_secs = 1u64 << (attempt - 1);
                    warn!(attempt, backoff_secs, error = %err, "embedding call failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

impl HttpEmbedder {
    async fn try_embed(&self, api_key: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .context("embedding request failed to send")?;

        if !response.status().is_success() {
            anyhow::bail!("embedding endpoint returned status {}", response.status());
        }

        let body: serde_json::Value = response.json().await.context("invalid embedding response body")?;
        let data = body["data"]
            .as_array()
            .context("embedding response missing 'data' array")?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item["embedding"]
                .as_array()
                .context("embedding item missing 'embedding' array")?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            vectors.push(embedding);
        }
        Ok(vectors)
    }
}

// ───────────────────────────── Local provider ─────────────────────────────

/// In-process embedding via `fastembed`. The underlying ONNX session is not
/// `Sync`-friendly for concurrent inference calls, so access is serialized
/// behind a `Mutex`, matching the lazy-init-then-guard pattern used for
/// local transformer models in `vyotiq-ai-vyotiq-agent/src/embedder.rs`.
pub struct LocalEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    dims: usize,
}

impl LocalEmbedder {
    pub fn new(model_name: &str) -> Result<Self> {
        let model_code = resolve_model(model_name);
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model_code).with_show_download_progress(false),
        )
        .context("failed to initialize local embedding model")?;
        Ok(Self {
            model: Mutex::new(model),
            dims: 384,
        })
    }
}

fn resolve_model(name: &str) -> fastembed::EmbeddingModel {
    if name.to_lowercase().contains("base") {
        fastembed::EmbeddingModel::BGEBaseENV15
    } else {
        fastembed::EmbeddingModel::BGESmallENV15
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let owned: Vec<String> = texts.to_vec();
            let result = {
                let model = self.model.lock();
                model.embed(owned, None)
            };
            match result {
                Ok(vectors) => return Ok(vectors),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let backoff_secs = 1u64 << (attempt - 1);
                    warn!(attempt, backoff_secs, %err, "local embedding call failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(err) => return Err(anyhow::anyhow!("local embedding failed: {err}")),
            }
        }
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

// ───────────────────────────── Vector codec ─────────────────────────────

/// Encode a vector as a little-endian f32 BLOB for SQLite storage.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Decode a little-endian f32 BLOB back into a vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity. Returns 0.0 on empty input, mismatched lengths, or a
/// near-zero denominator, matching teacher's `cosine_similarity`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a < 1e-12 || norm_b < 1e-12 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vector = vec![0.1f32, -0.2, 3.0, 0.0];
        let blob = vec_to_blob(&vector);
        let back = blob_to_vec(&blob);
        assert_eq!(vector, back);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let vector = vec![1.0f32, 2.0, 3.0];
        let sim = cosine_similarity(&vector, &vector);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        let a = vec![0.0f32, 0.0];
        let b = vec![1.0f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
