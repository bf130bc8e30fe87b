//! Embedding provider abstraction and vector helpers.
//!
//! - **[`DisabledProvider`]** fails every call; paper search then falls
//!   back to keyword matching.
//! - **[`OpenAIProvider`]** calls `POST {openai_base_url}/v1/embeddings`
//!   with batching and backoff.
//!
//! Vectors are stored in SQLite as little-endian `f32` blobs
//! ([`vec_to_blob`] / [`blob_to_vec`]) and compared in process with
//! [`cosine_similarity`].
//!
//! Throttling (429), 5xx responses and transport errors are retried with
//! exponential backoff starting at one second. Any other 4xx fails at once.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::http::{is_transient, with_retry_if, StatusError};

const RETRY_BASE_MS: u64 = 1000;

/// Upper bound on characters sent for a single query embedding.
pub const MAX_QUERY_CHARS: usize = 8000;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    fn is_enabled(&self) -> bool {
        self.dims() > 0
    }
    /// Embed a batch, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query, truncated to [`MAX_QUERY_CHARS`].
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let text = crate::http::truncate_chars(text, MAX_QUERY_CHARS).to_string();
    provider
        .embed(&[text])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("embedding response had no vectors"))
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Fails when `model`/`dims` are unset or no OpenAI key is configured.
    pub fn new(config: &Config) -> Result<Self> {
        let emb = &config.embedding;
        let (Some(model), Some(dims)) = (emb.model.clone(), emb.dims) else {
            bail!("embedding.model and embedding.dims must be set for the openai provider");
        };
        let Some(api_key) = config.apis.openai_key() else {
            bail!("OpenAI key not configured");
        };

        Ok(Self {
            model,
            dims,
            api_key,
            base_url: config.apis.openai_base_url.trim_end_matches('/').to_string(),
            batch_size: emb.batch_size.max(1),
            max_retries: emb.max_retries,
            client: crate::http::client(emb.timeout_secs)?,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({ "model": self.model, "input": texts });

        let response: EmbeddingResponse = with_retry_if(self.max_retries, RETRY_BASE_MS, is_transient, || async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(StatusError { service: "OpenAI", status, body }.into());
            }
            Ok(resp.json().await?)
        })
        .await?;

        let vectors = response.into_ordered();
        if vectors.len() != texts.len() {
            bail!("expected {} embeddings, got {}", texts.len(), vectors.len());
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Vectors in request order. Items without an `index` keep their position.
    fn into_ordered(self) -> Vec<Vec<f32>> {
        let mut items: Vec<(usize, Vec<f32>)> = self
            .data
            .into_iter()
            .enumerate()
            .map(|(pos, item)| (item.index.unwrap_or(pos), item.embedding))
            .collect();
        items.sort_by_key(|(i, _)| *i);
        items.into_iter().map(|(_, v)| v).collect()
    }
}

/// Build the configured provider. A disabled config, or an enabled one
/// without an OpenAI key, yields [`DisabledProvider`].
pub fn create_provider(config: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => {
            if config.apis.openai_key().is_none() {
                tracing::warn!("embedding provider is openai but no OpenAI key is set; disabling");
                return Ok(Box::new(DisabledProvider));
            }
            Ok(Box::new(OpenAIProvider::new(config)?))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Vector helpers ============

pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; 0.0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, x2, y2), (x, y)| {
            (d + x * y, x2 + x * x, y2 + y * y)
        });
    let norm = (aa * bb).sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_is_little_endian() {
        let blob = vec_to_blob(&[1.0, -0.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(blob_to_vec(&blob), vec![1.0, -0.5]);
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = [0.3, 1.7, -2.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_response_ordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        }))
        .unwrap();
        assert_eq!(response.into_ordered(), vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_response_requires_data() {
        let parsed = serde_json::from_value::<EmbeddingResponse>(serde_json::json!({"error": "x"}));
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = embed_query(&DisabledProvider, "vitamin d").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
