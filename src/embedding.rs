//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`OpenAiEmbedder`]** — calls `POST /v1/embeddings`.
//! - **[`GeminiEmbedder`]** — calls `models/{model}:batchEmbedContents`.
//!
//! Both batch their input by `embedding.batch_size` and share the retry
//! policy in [`crate::transport`].
//!
//! Also provides [`cosine_similarity`] for comparing vectors.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] with the page's resolved provider and the API
//! key from [`crate::keys::ApiKeys`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, Provider};
use crate::transport;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Create the embedder for `provider`.
pub fn create_embedder(
    config: &EmbeddingConfig,
    provider: Provider,
    api_key: &str,
) -> Result<Arc<dyn Embedder>> {
    let model = config.model_for(provider).to_string();
    Ok(match provider {
        Provider::OpenAi => Arc::new(OpenAiEmbedder::new(config, model, api_key)?),
        Provider::Gemini => Arc::new(GeminiEmbedder::new(config, model, api_key)?),
    })
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    url: String,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, model: String, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: transport::client(config.timeout_secs)?,
            model,
            api_key: api_key.to_string(),
            url: OPENAI_EMBEDDINGS_URL.to_string(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let auth = format!("Bearer {}", self.api_key);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = transport::post_json(
                &self.client,
                "OpenAI",
                &self.url,
                &[("Authorization", auth.as_str())],
                &body,
                self.max_retries,
            )
            .await?;
            let vectors = parse_openai_response(&json)?;
            if vectors.len() != batch.len() {
                bail!(
                    "OpenAI returned {} embeddings for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Gemini ============

pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    batch_size: usize,
    max_retries: u32,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, model: String, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: transport::client(config.timeout_secs)?,
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            // batchEmbedContents accepts at most 100 requests.
            batch_size: config.batch_size.clamp(1, 100),
            max_retries: config.max_retries,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);
        let model_ref = format!("models/{}", self.model);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let requests: Vec<serde_json::Value> = batch
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "model": model_ref,
                        "content": { "parts": [{ "text": t }] },
                    })
                })
                .collect();
            let body = serde_json::json!({ "requests": requests });
            let json = transport::post_json(
                &self.client,
                "Gemini",
                &url,
                &[("x-goog-api-key", self.api_key.as_str())],
                &body,
                self.max_retries,
            )
            .await?;
            let vectors = parse_gemini_response(&json)?;
            if vectors.len() != batch.len() {
                bail!(
                    "Gemini returned {} embeddings for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Extract `embeddings[].values`.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.get("values")
                .and_then(|v| v.as_array())
                .map(|v| to_f32_vec(v))
                .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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
