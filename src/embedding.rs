//! Embedding backend abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`RemoteEmbedder`]**: posts each text to a configured HTTP endpoint.
//! - **`LocalEmbedder`**: runs a sentence-embedding model in-process via
//!   fastembed (feature `local-embeddings`); the model is loaded at most
//!   once per process and reused.
//! - **[`PseudoEmbedder`]**: deterministic character-code vectors for
//!   offline runs and tests.
//!
//! Also provides vector utilities shared with the index layer:
//! - [`cosine_similarity`]: similarity between two vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 byte packing
//!   used by the binary index snapshot
//!
//! # Backend selection
//!
//! Use [`create_embedder`] to instantiate a backend from configuration.
//! With `provider = "remote"` the embedder is wrapped in a fallback chain:
//! an endpoint failure logs a warning and falls back to the local model
//! (or the pseudo backend when local inference is compiled out). Remote
//! calls are single-shot with a timeout; a transient failure routes to the
//! fallback rather than retrying.
//!
//! ```rust,no_run
//! # use raia_assist::config::EmbeddingConfig;
//! # use raia_assist::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "pseudo"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "pseudo");
//! ```
//!
//! Every backend returns vectors of exactly `dims` dimensions; a
//! wrong-sized backend response is a hard error, never padded or
//! truncated.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding backends.
///
/// One vector per input text, in input order, each exactly [`dims`] long.
///
/// [`dims`]: Embedder::dims
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the backend identifier (a model name or backend kind).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl std::fmt::Debug for dyn Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.model_name())
            .field("dims", &self.dims())
            .finish()
    }
}

/// Embed a single query text.
///
/// Convenience wrapper around [`Embedder::embed`] for single-text use
/// cases (embedding a chat message before searching the index).
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Fail when a vector's length disagrees with the expected dimension.
/// Mismatches are never padded or truncated.
pub fn check_dims(vec: &[f32], dims: usize) -> Result<()> {
    if vec.len() != dims {
        bail!(
            "Embedding shape mismatch: expected {} dims, got {}",
            dims,
            vec.len()
        );
    }
    Ok(())
}

// ============ Remote Embedder ============

/// Embedding backend calling an HTTP endpoint.
///
/// Sends `POST {endpoint}` with body `{"input": text}` per text and parses
/// `{"embedding": [f32, ...]}` from the response. The returned vector must
/// match the configured dimension exactly.
pub struct RemoteEmbedder {
    endpoint: String,
    dims: usize,
    client: reqwest::Client,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            bail!("embedding.endpoint required for the remote backend");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            dims: config.dims,
            client,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        "remote"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({ "input": text });
            let response = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                bail!("Embedding endpoint error {}: {}", status, body_text);
            }

            let json: serde_json::Value = response.json().await?;
            embeddings.push(parse_remote_response(&json, self.dims)?);
        }
        Ok(embeddings)
    }
}

/// Parse a remote embedding response and validate its shape.
fn parse_remote_response(json: &serde_json::Value, dims: usize) -> Result<Vec<f32>> {
    let embedding = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding array"))?;

    let vec: Vec<f32> = embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    check_dims(&vec, dims)?;
    Ok(vec)
}

// ============ Local Embedder (fastembed) ============

/// Embedding backend running a fastembed model in-process.
///
/// The model is downloaded on first use and cached; after that, no network
/// calls are needed. Loading takes seconds, so the model is initialized at
/// most once per process and shared by every subsequent call.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: tokio::sync::OnceCell<std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        // Validate the model name eagerly so a typo fails at startup,
        // not on the first embed call.
        config_to_fastembed_model(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            model: tokio::sync::OnceCell::new(),
        })
    }

    async fn model(&self) -> Result<std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>> {
        let model_name = self.model_name.clone();
        self.model
            .get_or_try_init(|| async move {
                let fastembed_model = config_to_fastembed_model(&model_name)?;
                let model = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(fastembed_model)
                            .with_show_download_progress(true),
                    )
                    .map_err(|e| {
                        anyhow::anyhow!("Failed to initialize local embedding model: {}", e)
                    })
                })
                .await??;
                Ok::<_, anyhow::Error>(std::sync::Arc::new(std::sync::Mutex::new(model)))
            })
            .await
            .cloned()
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model().await?;
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Embedding model lock poisoned"))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await??;

        for vec in &embeddings {
            check_dims(vec, self.dims)?;
        }
        Ok(embeddings)
    }
}

/// Map a configured model name to a fastembed model.
#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, multilingual-e5-small",
            other
        ),
    }
}

// ============ Pseudo Embedder ============

/// Deterministic offline backend.
///
/// Each character contributes `(codepoint % 100) / 100` to the vector;
/// texts shorter than the dimension are zero-padded. Useless as semantics,
/// but stable across runs, which is what the offline pipeline and the test
/// suite need.
pub struct PseudoEmbedder {
    dims: usize,
}

impl PseudoEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self { dims: config.dims }
    }
}

#[async_trait]
impl Embedder for PseudoEmbedder {
    fn model_name(&self) -> &str {
        "pseudo"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| pseudo_vector(t, self.dims)).collect())
    }
}

/// Deterministic pseudo-embedding: one value per character of the prefix,
/// zero-padded to exactly `dims` dimensions.
pub fn pseudo_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut vec: Vec<f32> = text
        .chars()
        .take(dims)
        .map(|c| ((c as u32) % 100) as f32 / 100.0)
        .collect();
    vec.resize(dims, 0.0);
    vec
}

// ============ Fallback chain ============

/// Wraps a primary backend with a fallback used when the primary errors.
///
/// The failure is logged to stderr. Both backends are configured with the
/// same dimension, so a fallback vector is interchangeable with a primary
/// one inside a single process; mixing them across a build and later
/// queries degrades ranking quality but never breaks the index contract.
pub struct FallbackEmbedder {
    primary: Box<dyn Embedder>,
    fallback: Box<dyn Embedder>,
}

impl FallbackEmbedder {
    pub fn new(primary: Box<dyn Embedder>, fallback: Box<dyn Embedder>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    fn dims(&self) -> usize {
        self.primary.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.primary.embed(texts).await {
            Ok(embeddings) => Ok(embeddings),
            Err(e) => {
                eprintln!(
                    "Warning: {} embedding failed: {}. Falling back to {}.",
                    self.primary.model_name(),
                    e,
                    self.fallback.model_name()
                );
                self.fallback.embed(texts).await
            }
        }
    }
}

/// Create the appropriate [`Embedder`] based on configuration.
///
/// | Config value | Backend |
/// |--------------|---------|
/// | `"pseudo"` | [`PseudoEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings`) |
/// | `"remote"` | [`RemoteEmbedder`] wrapped in a [`FallbackEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "pseudo" => Ok(Box::new(PseudoEmbedder::new(config))),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding backend requires --features local-embeddings"),
        "remote" => {
            let primary: Box<dyn Embedder> = Box::new(RemoteEmbedder::new(config)?);
            #[cfg(feature = "local-embeddings")]
            let fallback: Box<dyn Embedder> = Box::new(LocalEmbedder::new(config)?);
            #[cfg(not(feature = "local-embeddings"))]
            let fallback: Box<dyn Embedder> = Box::new(PseudoEmbedder::new(config));
            Ok(Box::new(FallbackEmbedder::new(primary, fallback)))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian f32 bytes.
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// `vec.len() × 4` bytes. This is the layout of the packed index
/// snapshot's data section.
///
/// # Example
///
/// ```rust
/// use raia_assist::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// vectors of different lengths, or a zero-magnitude vector.
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
