//! Embedding backend abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two configuration-selected
//! backends:
//! - **openai** — an OpenAI-compatible `POST /v1/embeddings` call with
//!   batching, timeout, and exponential-backoff retry. The base URL is
//!   configurable so any compatible endpoint (or a test mock) can serve it.
//! - **local** — fastembed models run in-process behind a lazily initialized
//!   process-wide instance; the first caller loads the model, concurrent
//!   callers wait on the guard rather than loading a second copy.
//!
//! Both backends must produce vectors of the configured dimension; a
//! response with a missing, empty, or wrong-size vector is a hard
//! [`PipelineError::Embedding`] for the whole batch. No zero-vector
//! placeholders, ever.
//!
//! Also provides the vector utilities shared by ingestion and retrieval:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`].
//!
//! # Retry Strategy (openai backend)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::Result;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::errors::PipelineError;

/// Trait for embedding backends.
///
/// Carries backend metadata; the embedding computation itself lives in the
/// free functions [`embed_texts`]/[`embed_query`] (async trait methods on a
/// boxed provider buy nothing here).
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`, `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality this deployment is pinned to.
    fn dims(&self) -> usize;
}

/// Embed a batch of texts with the configured backend.
///
/// Returns one vector per input text, in input order. Fails with an
/// embedding error if the backend is unreachable, the response is
/// malformed, the vector count does not match the input count, or any
/// vector's dimension disagrees with the configuration.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = match config.provider.as_str() {
        "openai" => embed_openai(config, texts).await?,
        #[cfg(feature = "local-embeddings")]
        "local" => embed_local(config, texts).await?,
        #[cfg(not(feature = "local-embeddings"))]
        "local" => {
            return Err(PipelineError::embedding(
                "local embedding provider requires building with --features local-embeddings",
            ))
        }
        other => {
            return Err(PipelineError::embedding(format!(
                "unknown embedding provider: {}",
                other
            )))
        }
    };

    validate_vectors(config, texts.len(), &vectors)?;
    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::embedding("empty embedding response"))
}

/// Reject count mismatches and malformed/wrong-dimension vectors.
fn validate_vectors(
    config: &EmbeddingConfig,
    expected_count: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(PipelineError::embedding(format!(
            "backend returned {} vectors for {} texts",
            vectors.len(),
            expected_count
        )));
    }
    for (i, v) in vectors.iter().enumerate() {
        if v.is_empty() {
            return Err(PipelineError::embedding(format!(
                "backend returned an empty vector for text {}",
                i
            )));
        }
        if let Some(dims) = config.dims {
            if v.len() != dims {
                return Err(PipelineError::embedding(format!(
                    "vector {} has dimension {} but deployment is pinned to {}",
                    i,
                    v.len(),
                    dims
                )));
            }
        }
    }
    Ok(())
}

// ============ OpenAI-compatible remote backend ============

/// Remote embedding provider speaking the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| PipelineError::input("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| PipelineError::input("embedding.dims required for openai provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(PipelineError::input(
                "OPENAI_API_KEY environment variable not set",
            ));
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

fn openai_base_url(config: &EmbeddingConfig) -> String {
    config
        .base_url
        .as_deref()
        .unwrap_or("https://api.openai.com")
        .trim_end_matches('/')
        .to_string()
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| PipelineError::input("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| PipelineError::input("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| PipelineError::embedding(e.to_string()))?;

    let url = format!("{}/v1/embeddings", openai_base_url(config));
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| PipelineError::embedding(e.to_string()))?;
                    return parse_embeddings_response(&json);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(PipelineError::embedding(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                return Err(PipelineError::embedding(format!(
                    "embedding API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(PipelineError::embedding(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| PipelineError::embedding("embedding failed after retries")))
}

/// Parse the `data[].embedding` arrays out of an embeddings API response.
/// Loose shapes from the wire stop here; core code only ever sees `Vec<f32>`.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| PipelineError::embedding("invalid response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| PipelineError::embedding("invalid response: missing embedding"))?;

        let mut vec = Vec::with_capacity(embedding.len());
        for v in embedding {
            let f = v
                .as_f64()
                .ok_or_else(|| PipelineError::embedding("invalid response: non-numeric value"))?;
            vec.push(f as f32);
        }
        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Local backend (fastembed) ============

/// In-process embedding provider backed by fastembed.
///
/// The model is downloaded on first use and cached; after that, embedding
/// runs fully offline.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config)?;
        Ok(Self { model_name, dims })
    }
}

#[cfg(feature = "local-embeddings")]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[cfg(feature = "local-embeddings")]
fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "nomic-embed-text-v1.5" => 768,
        _ => 384,
    });

    Ok((model_name, dims))
}

#[cfg(feature = "local-embeddings")]
fn local_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => Err(PipelineError::input(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ))),
    }
}

/// Process-wide model instance. Loading is expensive, so exactly one copy
/// exists: the first caller initializes it inside the lock, concurrent
/// first callers block until it is ready.
#[cfg(feature = "local-embeddings")]
static LOCAL_MODEL: std::sync::Mutex<Option<fastembed::TextEmbedding>> =
    std::sync::Mutex::new(None);

#[cfg(feature = "local-embeddings")]
async fn embed_local(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
    let fastembed_model = local_fastembed_model(&model_name)?;
    let batch_size = config.batch_size;
    let texts = texts.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut guard = LOCAL_MODEL
            .lock()
            .map_err(|_| PipelineError::embedding("local embedding model lock poisoned"))?;

        if guard.is_none() {
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| {
                PipelineError::embedding(format!("failed to initialize local model: {}", e))
            })?;
            *guard = Some(model);
        }

        let model = guard.as_mut().ok_or_else(|| {
            PipelineError::embedding("local embedding model missing after initialization")
        })?;

        model
            .embed(texts, Some(batch_size))
            .map_err(|e| PipelineError::embedding(format!("local embedding failed: {}", e)))
    })
    .await
    .map_err(|e| PipelineError::embedding(format!("embedding task panicked: {}", e)))?
}

/// Create the configured [`EmbeddingProvider`].
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(PipelineError::input(
            "local embedding provider requires building with --features local-embeddings",
        )),
        other => Err(PipelineError::input(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_parse_embeddings_response() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let vecs = parse_embeddings_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[1].len(), 2);
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        let json = serde_json::json!({ "unexpected": true });
        assert!(parse_embeddings_response(&json).is_err());
    }

    #[test]
    fn test_parse_rejects_non_numeric_values() {
        let json = serde_json::json!({ "data": [ { "embedding": [0.1, "nope"] } ] });
        assert!(parse_embeddings_response(&json).is_err());
    }

    #[test]
    fn test_validate_rejects_count_mismatch() {
        let config = EmbeddingConfig::default();
        let err = validate_vectors(&config, 2, &[vec![0.1]]).unwrap_err();
        assert!(err.to_string().contains("embedding"));
    }

    #[test]
    fn test_validate_rejects_wrong_dimension() {
        let config = EmbeddingConfig {
            dims: Some(3),
            ..EmbeddingConfig::default()
        };
        assert!(validate_vectors(&config, 1, &[vec![0.1, 0.2]]).is_err());
        assert!(validate_vectors(&config, 1, &[vec![0.1, 0.2, 0.3]]).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_vector() {
        let config = EmbeddingConfig::default();
        assert!(validate_vectors(&config, 1, &[vec![]]).is_err());
    }
}
